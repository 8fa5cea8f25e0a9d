//! Gesture tracker — drag, rubber-band, flick detection and spring settle.
//!
//! # States
//! ```text
//!  Idle ──pointer_down──▶ Dragging ──pointer_up──▶ Animating ──settled──▶ Idle
//!    ▲                                                 │
//!    └────────────── pointer_down (cancels) ◀──────────┘
//! ```
//!
//! The tracker is synchronous and clock-agnostic: every input carries its
//! own `Instant`, and animation frames pass their elapsed time to `tick`.
//! The index change is never performed here; `tick` reports `Snap::Next` /
//! `Snap::Previous` once the slide-out animation has finished and the caller
//! applies it to the navigation state in the same frame.

use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::spring::{Spring, SpringParams};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct GestureConfig {
    /// Fraction of the viewport height a drag must cover to navigate.
    #[serde(default = "default_drag_threshold")]
    pub drag_threshold: f32,
    /// Release speed (px/ms) above which a flick navigates regardless of distance.
    #[serde(default = "default_velocity_threshold")]
    pub velocity_threshold: f32,
    #[serde(default = "default_rubber_band_factor")]
    pub rubber_band_factor: f32,
    /// Asymptote scale for boundary overscroll (px).
    #[serde(default = "default_rubber_band_max")]
    pub rubber_band_max: f32,
}

fn default_drag_threshold() -> f32 {
    0.15
}

fn default_velocity_threshold() -> f32 {
    0.3
}

fn default_rubber_band_factor() -> f32 {
    0.4
}

fn default_rubber_band_max() -> f32 {
    120.0
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            drag_threshold: default_drag_threshold(),
            velocity_threshold: default_velocity_threshold(),
            rubber_band_factor: default_rubber_band_factor(),
            rubber_band_max: default_rubber_band_max(),
        }
    }
}

/// Outcome of a released drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Snap {
    Next,
    Previous,
    Current,
}

/// Which directions the navigation layer can currently move in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NavBounds {
    pub can_go_next: bool,
    pub can_go_previous: bool,
}

impl NavBounds {
    pub const BOTH: NavBounds = NavBounds {
        can_go_next: true,
        can_go_previous: true,
    };
    pub const NONE: NavBounds = NavBounds {
        can_go_next: false,
        can_go_previous: false,
    };
}

/// What the pointer landed on when the gesture began.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointerTarget {
    /// The carousel surface itself.
    Surface,
    /// Buttons and links.
    Control,
    /// An embedded video frame.
    Embed,
    /// An element explicitly flagged to opt out of dragging.
    OptOut,
}

impl PointerTarget {
    pub fn is_interactive(&self) -> bool {
        !matches!(self, PointerTarget::Surface)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewportClass {
    Desktop,
    /// Narrow viewports use discrete selection; dragging is off.
    Narrow,
}

/// Why a pointer-down did not start a drag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureTargetIgnored {
    InteractiveTarget(PointerTarget),
    DisabledForViewport,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragStart {
    Started,
    Ignored(GestureTargetIgnored),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GesturePhase {
    Idle,
    Dragging,
    Animating,
}

/// Ephemeral per-gesture bookkeeping.
#[derive(Debug, Clone, Copy)]
struct DragSession {
    start_y: f32,
    last_y: f32,
    last_at: Instant,
}

#[derive(Debug, Clone, Copy)]
struct Settle {
    spring: Spring,
    snap: Snap,
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Idle,
    Dragging(DragSession),
    Animating(Settle),
}

/// Logarithmic resistance toward `max * factor`; never reaches the asymptote.
pub fn rubber_band(raw: f32, factor: f32, max: f32) -> f32 {
    let magnitude = raw.abs();
    let resisted = (magnitude * factor / (1.0 + magnitude / max)).min(max * factor);
    resisted.copysign(raw)
}

/// Decide where a released drag should land.
///
/// A flick (|velocity| above threshold) wins over distance; otherwise the
/// drag must have covered more than `drag_threshold` of the viewport.
/// Negative offset/velocity means upward motion, i.e. toward the next item.
pub fn should_snap(
    offset: f32,
    velocity: f32,
    viewport_height: f32,
    bounds: NavBounds,
    config: &GestureConfig,
) -> Snap {
    if velocity.abs() > config.velocity_threshold {
        if velocity < 0.0 && bounds.can_go_next {
            return Snap::Next;
        }
        if velocity > 0.0 && bounds.can_go_previous {
            return Snap::Previous;
        }
    }

    if viewport_height > 0.0 && offset.abs() / viewport_height > config.drag_threshold {
        if offset < 0.0 && bounds.can_go_next {
            return Snap::Next;
        }
        if offset > 0.0 && bounds.can_go_previous {
            return Snap::Previous;
        }
    }

    Snap::Current
}

pub struct GestureTracker {
    config: GestureConfig,
    spring: SpringParams,
    viewport: ViewportClass,
    phase: Phase,
    /// Live visual offset (px).  Written only by the tracker.
    offset: f32,
    /// Last instantaneous velocity (px/ms).
    velocity: f32,
}

impl GestureTracker {
    pub fn new(config: GestureConfig, spring: SpringParams) -> Self {
        Self {
            config,
            spring,
            viewport: ViewportClass::Desktop,
            phase: Phase::Idle,
            offset: 0.0,
            velocity: 0.0,
        }
    }

    pub fn config(&self) -> &GestureConfig {
        &self.config
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn velocity(&self) -> f32 {
        self.velocity
    }

    pub fn phase(&self) -> GesturePhase {
        match self.phase {
            Phase::Idle => GesturePhase::Idle,
            Phase::Dragging(_) => GesturePhase::Dragging,
            Phase::Animating(_) => GesturePhase::Animating,
        }
    }

    pub fn is_dragging(&self) -> bool {
        matches!(self.phase, Phase::Dragging(_))
    }

    pub fn is_animating(&self) -> bool {
        matches!(self.phase, Phase::Animating(_))
    }

    pub fn is_enabled(&self) -> bool {
        self.viewport == ViewportClass::Desktop
    }

    /// Switching to a narrow viewport drops any gesture in progress.
    pub fn set_viewport_class(&mut self, class: ViewportClass) {
        if class == self.viewport {
            return;
        }
        debug!("gesture: viewport {:?} → {:?}", self.viewport, class);
        self.viewport = class;
        if class == ViewportClass::Narrow {
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.offset = 0.0;
        self.velocity = 0.0;
    }

    /// Begin a drag.  Any running settle animation is cancelled first, with
    /// no completion reported for it.
    pub fn pointer_down(&mut self, y: f32, at: Instant, target: PointerTarget) -> DragStart {
        if !self.is_enabled() {
            return DragStart::Ignored(GestureTargetIgnored::DisabledForViewport);
        }
        if target.is_interactive() {
            debug!("gesture: ignoring pointer-down on {:?}", target);
            return DragStart::Ignored(GestureTargetIgnored::InteractiveTarget(target));
        }
        if let Phase::Animating(settle) = self.phase {
            debug!(
                "gesture: cancelling {:?} settle at offset {:.1}",
                settle.snap,
                settle.spring.position()
            );
        }
        self.phase = Phase::Dragging(DragSession {
            start_y: y,
            last_y: y,
            last_at: at,
        });
        self.offset = 0.0;
        self.velocity = 0.0;
        DragStart::Started
    }

    /// Track a move sample.  Ignored unless a drag is active.
    pub fn pointer_move(&mut self, y: f32, at: Instant, bounds: NavBounds) {
        let Phase::Dragging(ref mut session) = self.phase else {
            return;
        };

        let raw = y - session.start_y;
        let blocked = (raw < 0.0 && !bounds.can_go_next) || (raw > 0.0 && !bounds.can_go_previous);
        self.offset = if blocked {
            rubber_band(
                raw,
                self.config.rubber_band_factor,
                self.config.rubber_band_max,
            )
        } else {
            raw
        };

        // Velocity between the two most recent samples only.
        let dt_ms = at.saturating_duration_since(session.last_at).as_secs_f32() * 1000.0;
        if dt_ms > 0.0 {
            self.velocity = (y - session.last_y) / dt_ms;
        }
        session.last_y = y;
        session.last_at = at;
    }

    /// Release (pointer-up, touch-end/cancel, pointer leaving the surface).
    /// Returns the snap decision and starts the settle animation, or `None`
    /// when no drag was active.
    pub fn pointer_up(&mut self, viewport_height: f32, bounds: NavBounds) -> Option<Snap> {
        if !self.is_dragging() {
            return None;
        }

        let snap = should_snap(
            self.offset,
            self.velocity,
            viewport_height,
            bounds,
            &self.config,
        );
        let target = match snap {
            Snap::Next => -viewport_height,
            Snap::Previous => viewport_height,
            Snap::Current => 0.0,
        };
        debug!(
            "gesture: release offset={:.1}px velocity={:.3}px/ms → {:?}",
            self.offset, self.velocity, snap
        );

        // Spring runs in px/s.
        let spring = Spring::new(self.offset, self.velocity * 1000.0, target, self.spring);
        self.phase = Phase::Animating(Settle { spring, snap });
        Some(snap)
    }

    /// Advance the settle animation by `dt` seconds.
    ///
    /// Returns `Some(Snap::Next | Snap::Previous)` on the frame the slide-out
    /// completes; the offset is already back at 0 so the caller must apply
    /// the navigation in the same frame.
    pub fn tick(&mut self, dt: f32) -> Option<Snap> {
        let Phase::Animating(ref mut settle) = self.phase else {
            return None;
        };

        let settled = settle.spring.advance(dt);
        self.offset = settle.spring.position();
        if !settled {
            return None;
        }

        let snap = settle.snap;
        self.reset();
        match snap {
            Snap::Current => None,
            other => Some(other),
        }
    }
}
