// SPDX-License-Identifier: MIT OR Apache-2.0
//! A single animation bound to one target node.

use crate::config::Iterations;
use kinetic_graph::{AnimationId, NodeTag};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DriverState {
    /// Created, waiting for its first frame
    #[default]
    Pending,
    /// Stepping every frame
    Running,
    /// Reached its end condition
    Finished,
    /// Cancelled, replaced, or its target was dropped
    Stopped,
}

impl DriverState {
    /// Whether the driver still steps
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

/// Timing of the frame a driver is stepped in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    /// Engine clock in milliseconds
    pub now_ms: f64,
    /// Time since the current iteration began
    pub elapsed_ms: f64,
    /// Time since the previous step of this driver
    pub delta_ms: f64,
}

/// Value produced by one animation step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// New base value for the target
    pub value: f64,
    /// Whether the iteration reached its end
    pub finished: bool,
}

impl Sample {
    /// A sample that keeps running
    pub fn running(value: f64) -> Self {
        Self {
            value,
            finished: false,
        }
    }

    /// A sample that ends the iteration
    pub fn done(value: f64) -> Self {
        Self {
            value,
            finished: true,
        }
    }
}

/// Kind-specific animation curve
pub trait Animation: fmt::Debug + Send {
    /// Config name of the kind
    fn kind(&self) -> &'static str;

    /// Begin an iteration from `from`
    fn reset(&mut self, from: f64);

    /// Advance to `frame` and return the new value
    fn step(&mut self, frame: FrameTime) -> Sample;
}

/// Delivered to a completion callback exactly once
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnimationEnd {
    /// Animation that ended
    pub animation_id: AnimationId,
    /// `true` if the animation completed on its own
    pub finished: bool,
    /// Last value the driver wrote, if it ever stepped
    pub value: Option<f64>,
}

/// Callback run when an animation ends
pub type CompletionCallback = Box<dyn FnOnce(AnimationEnd) + Send>;

/// A terminal driver's end report together with its callback
pub struct Completion {
    end: AnimationEnd,
    callback: Option<CompletionCallback>,
}

impl Completion {
    /// End report
    pub fn end(&self) -> AnimationEnd {
        self.end
    }

    /// Run the callback, consuming the completion
    pub fn deliver(self) {
        if let Some(callback) = self.callback {
            callback(self.end);
        }
    }
}

impl fmt::Debug for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completion")
            .field("end", &self.end)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// An animation driving one value node
pub struct Driver {
    id: AnimationId,
    target: NodeTag,
    animation: Box<dyn Animation>,
    iterations: Iterations,
    completed_iterations: u32,
    state: DriverState,
    start_value: f64,
    iteration_start_ms: f64,
    last_step_ms: f64,
    last_value: Option<f64>,
    callback: Option<CompletionCallback>,
}

impl Driver {
    /// Create a pending driver
    pub fn new(
        id: AnimationId,
        target: NodeTag,
        animation: Box<dyn Animation>,
        iterations: Iterations,
    ) -> Self {
        Self {
            id,
            target,
            animation,
            iterations,
            completed_iterations: 0,
            state: DriverState::Pending,
            start_value: 0.0,
            iteration_start_ms: 0.0,
            last_step_ms: 0.0,
            last_value: None,
            callback: None,
        }
    }

    /// Attach a completion callback
    pub fn with_callback(mut self, callback: CompletionCallback) -> Self {
        self.callback = Some(callback);
        self
    }

    /// Animation id
    pub fn id(&self) -> AnimationId {
        self.id
    }

    /// Target node
    pub fn target(&self) -> NodeTag {
        self.target
    }

    /// Current state
    pub fn state(&self) -> DriverState {
        self.state
    }

    /// Kind name
    pub fn kind(&self) -> &'static str {
        self.animation.kind()
    }

    /// Last value written
    pub fn last_value(&self) -> Option<f64> {
        self.last_value
    }

    /// Advance to `now_ms`.
    ///
    /// `current` is the target's base value, used as the start value on the
    /// first step. Returns the value to write, or `None` once terminal.
    pub fn step(&mut self, now_ms: f64, current: f64) -> Option<f64> {
        match self.state {
            DriverState::Pending => {
                self.state = DriverState::Running;
                self.start_value = current;
                self.animation.reset(current);
                self.iteration_start_ms = now_ms;
                self.last_step_ms = now_ms;
                tracing::debug!(animation = %self.id, node = %self.target, kind = self.kind(), "driver running");
            }
            DriverState::Running => {}
            DriverState::Finished | DriverState::Stopped => return None,
        }

        let frame = FrameTime {
            now_ms,
            elapsed_ms: now_ms - self.iteration_start_ms,
            delta_ms: (now_ms - self.last_step_ms).max(0.0),
        };
        self.last_step_ms = now_ms;

        let sample = self.animation.step(frame);
        self.last_value = Some(sample.value);
        if sample.finished {
            self.completed_iterations = self.completed_iterations.saturating_add(1);
            if self.iterations.continues_after(self.completed_iterations) {
                self.animation.reset(self.start_value);
                self.iteration_start_ms = now_ms;
            } else {
                self.state = DriverState::Finished;
                tracing::debug!(animation = %self.id, value = sample.value, "driver finished");
            }
        }
        Some(sample.value)
    }

    /// Cancel the driver; takes effect before its next step
    pub fn stop(&mut self) {
        if self.state.is_active() {
            self.state = DriverState::Stopped;
            tracing::debug!(animation = %self.id, "driver stopped");
        }
    }

    /// Consume a terminal driver into its completion
    pub fn into_completion(self) -> Completion {
        Completion {
            end: AnimationEnd {
                animation_id: self.id,
                finished: self.state == DriverState::Finished,
                value: self.last_value,
            },
            callback: self.callback,
        }
    }
}

impl fmt::Debug for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Driver")
            .field("id", &self.id)
            .field("target", &self.target)
            .field("animation", &self.animation)
            .field("state", &self.state)
            .field("completed_iterations", &self.completed_iterations)
            .finish_non_exhaustive()
    }
}
