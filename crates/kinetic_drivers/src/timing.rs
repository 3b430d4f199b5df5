// SPDX-License-Identifier: MIT OR Apache-2.0
//! Timing animation: progress along a curve over a fixed duration.

use crate::driver::{Animation, FrameTime, Sample};
use crate::easing::Easing;

/// Where timing progress comes from
#[derive(Debug, Clone, PartialEq)]
pub enum TimingCurve {
    /// Eased progress over `duration` milliseconds
    Eased {
        /// Length of one run
        duration: f64,
        /// Curve applied to linear progress
        easing: Easing,
    },
    /// Progress table with one entry per 60 Hz frame
    Frames(Vec<f64>),
}

/// Timing animation state
#[derive(Debug, Clone, PartialEq)]
pub struct TimingAnimation {
    from: f64,
    to_value: f64,
    curve: TimingCurve,
    delay: f64,
}

impl TimingAnimation {
    /// Duration used when neither duration nor frames are given
    pub const DEFAULT_DURATION_MS: f64 = 500.0;
    /// Spacing of precomputed frames
    pub const FRAME_MS: f64 = 1000.0 / 60.0;

    /// Create a timing animation toward `to_value`
    pub fn new(to_value: f64, curve: TimingCurve, delay: f64) -> Self {
        Self {
            from: 0.0,
            to_value,
            curve,
            delay,
        }
    }

    fn at(&self, progress: f64) -> f64 {
        self.from + (self.to_value - self.from) * progress
    }
}

impl Animation for TimingAnimation {
    fn kind(&self) -> &'static str {
        "timing"
    }

    fn reset(&mut self, from: f64) {
        self.from = from;
    }

    fn step(&mut self, frame: FrameTime) -> Sample {
        let elapsed = frame.elapsed_ms - self.delay;
        if elapsed < 0.0 {
            return Sample::running(self.from);
        }

        match &self.curve {
            TimingCurve::Eased { duration, easing } => {
                if elapsed >= *duration {
                    Sample::done(self.to_value)
                } else {
                    Sample::running(self.at(easing.ease(elapsed / duration)))
                }
            }
            TimingCurve::Frames(frames) => {
                let index = (elapsed / Self::FRAME_MS).round() as usize;
                match frames.get(index) {
                    Some(progress) if index + 1 < frames.len() => Sample::running(self.at(*progress)),
                    _ => Sample::done(self.to_value),
                }
            }
        }
    }
}
