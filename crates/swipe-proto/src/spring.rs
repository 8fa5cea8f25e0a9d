//! Damped-harmonic-oscillator step used by the settle/snap animation.
//!
//! ```text
//!   force     = -tension * (position - target) - friction * velocity
//!   velocity += force * dt
//!   position += velocity * dt
//! ```
//!
//! Units: position in px, velocity in px/s, dt in seconds.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SpringParams {
    #[serde(default = "default_tension")]
    pub tension: f32,
    #[serde(default = "default_friction")]
    pub friction: f32,
    /// Rest threshold for |position - target| (px).
    #[serde(default = "default_position_epsilon")]
    pub position_epsilon: f32,
    /// Rest threshold for |velocity| (px/s).
    #[serde(default = "default_velocity_epsilon")]
    pub velocity_epsilon: f32,
}

fn default_tension() -> f32 {
    300.0
}

fn default_friction() -> f32 {
    26.0
}

fn default_position_epsilon() -> f32 {
    0.01
}

fn default_velocity_epsilon() -> f32 {
    1.0
}

impl Default for SpringParams {
    fn default() -> Self {
        Self {
            tension: default_tension(),
            friction: default_friction(),
            position_epsilon: default_position_epsilon(),
            velocity_epsilon: default_velocity_epsilon(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpringState {
    pub position: f32,
    pub velocity: f32,
}

/// Advance one explicit-Euler step.  Pure.
pub fn step(
    state: SpringState,
    target: f32,
    tension: f32,
    friction: f32,
    dt: f32,
) -> SpringState {
    let force = -tension * (state.position - target) - friction * state.velocity;
    let velocity = state.velocity + force * dt;
    let position = state.position + velocity * dt;
    SpringState { position, velocity }
}

/// True once both displacement and velocity are below the rest thresholds.
pub fn at_rest(state: SpringState, target: f32, params: &SpringParams) -> bool {
    (state.position - target).abs() < params.position_epsilon
        && state.velocity.abs() < params.velocity_epsilon
}

/// A running spring animation toward a fixed target.
#[derive(Debug, Clone, Copy)]
pub struct Spring {
    state: SpringState,
    target: f32,
    params: SpringParams,
}

impl Spring {
    pub fn new(position: f32, velocity: f32, target: f32, params: SpringParams) -> Self {
        Self {
            state: SpringState { position, velocity },
            target,
            params,
        }
    }

    pub fn position(&self) -> f32 {
        self.state.position
    }

    pub fn velocity(&self) -> f32 {
        self.state.velocity
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    /// Advance by `dt` seconds.  Returns `true` once settled, in which case
    /// the position has been snapped exactly onto the target.
    ///
    /// Large frame gaps are split into sub-steps of at most 1/120 s so the
    /// explicit integrator stays stable.
    pub fn advance(&mut self, dt: f32) -> bool {
        const MAX_STEP: f32 = 1.0 / 120.0;
        let mut remaining = dt.max(0.0);
        while remaining > 0.0 {
            let h = remaining.min(MAX_STEP);
            self.state = step(
                self.state,
                self.target,
                self.params.tension,
                self.params.friction,
                h,
            );
            remaining -= h;
        }
        if at_rest(self.state, self.target, &self.params) {
            self.state = SpringState {
                position: self.target,
                velocity: 0.0,
            };
            true
        } else {
            false
        }
    }
}
