//! Wheel/trackpad debouncer.
//!
//! Inertial scrolling produces a burst of small deltas.  They are summed and
//! only turned into a single next/previous decision once the wheel has been
//! quiet for `idle`.

use std::time::{Duration, Instant};

use crate::gesture::Snap;

pub const WHEEL_IDLE: Duration = Duration::from_millis(150);
/// Minimum accumulated |delta| (px) for a burst to count as navigation.
pub const WHEEL_MIN_DELTA: f32 = 100.0;

#[derive(Debug, Clone)]
pub struct WheelAccumulator {
    idle: Duration,
    min_delta: f32,
    delta: f32,
    last_at: Option<Instant>,
}

impl WheelAccumulator {
    pub fn new(idle: Duration, min_delta: f32) -> Self {
        Self {
            idle,
            min_delta,
            delta: 0.0,
            last_at: None,
        }
    }

    /// Add a wheel delta (positive = scroll down).  Restarts the idle window.
    pub fn push(&mut self, delta: f32, at: Instant) {
        self.delta += delta;
        self.last_at = Some(at);
    }

    pub fn is_pending(&self) -> bool {
        self.last_at.is_some()
    }

    /// Deadline at which `poll` will resolve the current burst.
    pub fn deadline(&self) -> Option<Instant> {
        self.last_at.map(|t| t + self.idle)
    }

    /// Resolve the burst if the idle window has elapsed.  Scrolling down
    /// maps to `Next`, up to `Previous`; small bursts resolve to `Current`.
    pub fn poll(&mut self, now: Instant) -> Option<Snap> {
        let last = self.last_at?;
        if now.saturating_duration_since(last) < self.idle {
            return None;
        }
        let accumulated = std::mem::take(&mut self.delta);
        self.last_at = None;
        Some(if accumulated.abs() <= self.min_delta {
            Snap::Current
        } else if accumulated > 0.0 {
            Snap::Next
        } else {
            Snap::Previous
        })
    }
}

impl Default for WheelAccumulator {
    fn default() -> Self {
        Self::new(WHEEL_IDLE, WHEEL_MIN_DELTA)
    }
}
