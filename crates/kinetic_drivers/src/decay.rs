// SPDX-License-Identifier: MIT OR Apache-2.0
//! Decay animation: a velocity that fades exponentially.

use crate::driver::{Animation, FrameTime, Sample};

/// Decay animation state
#[derive(Debug, Clone, PartialEq)]
pub struct DecayAnimation {
    initial_velocity: f64,
    deceleration: f64,
    position: f64,
    velocity: f64,
}

impl DecayAnimation {
    /// Speed, in units per second, below which the animation finishes
    pub const VELOCITY_EPSILON: f64 = 5.0;

    /// Default per-millisecond deceleration
    pub fn default_deceleration() -> f64 {
        0.998
    }

    /// Create a decay from a velocity in units per second
    pub fn new(velocity: f64, deceleration: f64) -> Self {
        Self {
            initial_velocity: velocity,
            deceleration,
            position: 0.0,
            velocity,
        }
    }

    /// Current velocity in units per second
    pub fn velocity(&self) -> f64 {
        self.velocity
    }
}

impl Animation for DecayAnimation {
    fn kind(&self) -> &'static str {
        "decay"
    }

    fn reset(&mut self, from: f64) {
        self.position = from;
        self.velocity = self.initial_velocity;
    }

    fn step(&mut self, frame: FrameTime) -> Sample {
        let d = self.deceleration;
        let kv = d.powf(frame.delta_ms);
        let kx = d * (1.0 - kv) / (1.0 - d);
        let v0 = self.velocity / 1000.0;

        self.position += v0 * kx;
        self.velocity = v0 * kv * 1000.0;

        if self.velocity.abs() < Self::VELOCITY_EPSILON {
            Sample::done(self.position)
        } else {
            Sample::running(self.position)
        }
    }
}
