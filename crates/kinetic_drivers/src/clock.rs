// SPDX-License-Identifier: MIT OR Apache-2.0
//! Clock animation: writes the engine frame time.

use crate::driver::{Animation, FrameTime, Sample};

/// Follows the frame clock in milliseconds until stopped
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClockAnimation;

impl Animation for ClockAnimation {
    fn kind(&self) -> &'static str {
        "clock"
    }

    fn reset(&mut self, _from: f64) {}

    fn step(&mut self, frame: FrameTime) -> Sample {
        Sample::running(frame.now_ms)
    }
}
