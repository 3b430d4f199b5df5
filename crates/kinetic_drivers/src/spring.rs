// SPDX-License-Identifier: MIT OR Apache-2.0
//! Spring animation: closed-form damped harmonic oscillator.
//!
//! Each step solves the oscillator analytically from the current position
//! and velocity over the elapsed frame time, so results do not depend on an
//! integration step size. Long frames are capped at [`SpringAnimation::MAX_STEP_MS`].

use crate::driver::{Animation, FrameTime, Sample};

/// Spring parameters and integration state
#[derive(Debug, Clone, PartialEq)]
pub struct SpringAnimation {
    /// Rest position
    pub to_value: f64,
    /// Spring constant
    pub stiffness: f64,
    /// Damping coefficient
    pub damping: f64,
    /// Mass
    pub mass: f64,
    /// Velocity at the start of each iteration, units per second
    pub initial_velocity: f64,
    /// Finish when the target is crossed
    pub overshoot_clamping: bool,
    /// Distance from the target considered at rest
    pub rest_displacement_threshold: f64,
    /// Speed considered at rest
    pub rest_speed_threshold: f64,
    position: f64,
    velocity: f64,
    prev_position: f64,
}

impl Default for SpringAnimation {
    fn default() -> Self {
        Self {
            to_value: 0.0,
            stiffness: Self::default_stiffness(),
            damping: Self::default_damping(),
            mass: Self::default_mass(),
            initial_velocity: 0.0,
            overshoot_clamping: false,
            rest_displacement_threshold: Self::default_threshold(),
            rest_speed_threshold: Self::default_threshold(),
            position: 0.0,
            velocity: 0.0,
            prev_position: 0.0,
        }
    }
}

impl SpringAnimation {
    /// Longest frame advanced in a single step
    pub const MAX_STEP_MS: f64 = 64.0;

    /// Spring toward `to_value` with default parameters
    pub fn new(to_value: f64) -> Self {
        Self {
            to_value,
            ..Self::default()
        }
    }

    /// Default spring constant
    pub fn default_stiffness() -> f64 {
        100.0
    }

    /// Default damping coefficient
    pub fn default_damping() -> f64 {
        10.0
    }

    /// Default mass
    pub fn default_mass() -> f64 {
        1.0
    }

    /// Default rest thresholds
    pub fn default_threshold() -> f64 {
        0.001
    }

    /// Current velocity in units per second
    pub fn velocity(&self) -> f64 {
        self.velocity
    }

    fn advance(&mut self, t: f64) {
        let k = self.stiffness;
        let m = self.mass;
        let zeta = self.damping / (2.0 * (k * m).sqrt());
        let omega0 = (k / m).sqrt();
        let x0 = self.to_value - self.position;
        let v0 = -self.velocity;

        if zeta < 1.0 {
            let omega1 = omega0 * (1.0 - zeta * zeta).sqrt();
            let envelope = (-zeta * omega0 * t).exp();
            let (sin1, cos1) = (omega1 * t).sin_cos();
            let frag = envelope * (sin1 * ((v0 + zeta * omega0 * x0) / omega1) + x0 * cos1);
            self.position = self.to_value - frag;
            self.velocity = zeta * omega0 * frag
                - envelope * (cos1 * (v0 + zeta * omega0 * x0) - omega1 * x0 * sin1);
        } else {
            let envelope = (-omega0 * t).exp();
            self.position = self.to_value - envelope * (x0 + (v0 + omega0 * x0) * t);
            self.velocity = envelope * (v0 * (t * omega0 - 1.0) + t * x0 * omega0 * omega0);
        }
    }

    fn at_rest(&self) -> bool {
        let overshooting = self.overshoot_clamping
            && self.stiffness != 0.0
            && if self.prev_position < self.to_value {
                self.position > self.to_value
            } else {
                self.position < self.to_value
            };
        let slow = self.velocity.abs() < self.rest_speed_threshold;
        let close = self.stiffness == 0.0
            || (self.to_value - self.position).abs() < self.rest_displacement_threshold;
        overshooting || (slow && close)
    }
}

impl Animation for SpringAnimation {
    fn kind(&self) -> &'static str {
        "spring"
    }

    fn reset(&mut self, from: f64) {
        self.position = from;
        self.prev_position = from;
        self.velocity = self.initial_velocity;
    }

    fn step(&mut self, frame: FrameTime) -> Sample {
        let t = frame.delta_ms.min(Self::MAX_STEP_MS) / 1000.0;
        self.prev_position = self.position;
        self.advance(t);

        if self.at_rest() {
            if self.stiffness != 0.0 {
                self.velocity = 0.0;
                self.position = self.to_value;
            }
            return Sample::done(self.position);
        }
        Sample::running(self.position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(delta_ms: f64) -> FrameTime {
        FrameTime {
            now_ms: 0.0,
            elapsed_ms: 0.0,
            delta_ms,
        }
    }

    fn spring(to_value: f64) -> SpringAnimation {
        SpringAnimation::new(to_value)
    }

    #[test]
    fn test_settles_on_target() {
        let mut anim = spring(1.0);
        anim.reset(0.0);
        let mut overshot = false;
        let mut last = Sample::running(0.0);
        for _ in 0..600 {
            last = anim.step(frame(1000.0 / 60.0));
            overshot |= last.value > 1.0;
            if last.finished {
                break;
            }
        }
        assert!(last.finished);
        assert_eq!(last.value, 1.0);
        assert!(overshot, "underdamped spring should overshoot");
    }

    #[test]
    fn test_overshoot_clamping_finishes_on_crossing() {
        let mut anim = SpringAnimation {
            overshoot_clamping: true,
            ..spring(10.0)
        };
        anim.reset(0.0);
        let mut steps = 0;
        loop {
            steps += 1;
            let sample = anim.step(frame(16.0));
            if sample.finished {
                assert_eq!(sample.value, 10.0);
                break;
            }
            assert!(sample.value <= 10.0);
            assert!(steps < 600);
        }
    }

    #[test]
    fn test_long_frames_are_capped() {
        let mut capped = spring(1.0);
        let mut reference = spring(1.0);
        capped.reset(0.0);
        reference.reset(0.0);
        assert_eq!(capped.step(frame(1000.0)), reference.step(frame(64.0)));
    }

    #[test]
    fn test_critically_damped_does_not_overshoot() {
        let mut anim = SpringAnimation {
            damping: 20.0,
            ..spring(1.0)
        };
        anim.reset(0.0);
        for _ in 0..600 {
            let sample = anim.step(frame(16.0));
            assert!(sample.value <= 1.0 + 1e-9);
            if sample.finished {
                return;
            }
        }
        panic!("spring never came to rest");
    }
}
