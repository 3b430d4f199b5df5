// SPDX-License-Identifier: MIT OR Apache-2.0
//! Refresh-driven frame loop.
//!
//! The loop subscribes to the host's display refresh only while there is
//! work to do and unsubscribes once idle. Time handed to drivers is a
//! virtual timeline built from clamped per-tick deltas, so a stalled host
//! advances animations by at most `max_frame_delta_ms` per tick.
//!
//! The subscription is shared with [`LoopWaker`] handles, so other threads
//! can resubscribe an idle loop after enqueueing work.

use parking_lot::Mutex;
use std::sync::Arc;

/// Host refresh subscription
pub trait DisplayLink: Send {
    /// Start delivering ticks
    fn start(&mut self);

    /// Stop delivering ticks
    fn stop(&mut self);
}

/// Loop subscription state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    /// Not subscribed to refresh ticks
    #[default]
    Idle,
    /// Subscribed; ticks drive the engine
    Running,
}

impl LoopState {
    /// Check if ticks are expected
    pub fn is_running(self) -> bool {
        matches!(self, LoopState::Running)
    }
}

/// Timing of one tick
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTiming {
    /// Ticks since the loop first started
    pub frame: u64,
    /// Virtual time handed to drivers, in milliseconds
    pub now_ms: f64,
    /// Clamped delta since the previous tick
    pub delta_ms: f64,
}

struct Subscription {
    state: LoopState,
    link: Box<dyn DisplayLink>,
    restarted: bool,
}

impl Subscription {
    fn start(&mut self) -> bool {
        if self.state.is_running() {
            return false;
        }
        self.state = LoopState::Running;
        self.restarted = true;
        self.link.start();
        true
    }

    fn stop(&mut self) -> bool {
        if !self.state.is_running() {
            return false;
        }
        self.state = LoopState::Idle;
        self.link.stop();
        true
    }
}

/// Thread-safe handle that resubscribes an idle frame loop
#[derive(Clone)]
pub struct LoopWaker {
    subscription: Arc<Mutex<Subscription>>,
}

impl LoopWaker {
    /// Ask for ticks; returns whether the loop was idle
    pub fn wake(&self) -> bool {
        let woke = self.subscription.lock().start();
        if woke {
            tracing::trace!("frame loop woken");
        }
        woke
    }
}

impl std::fmt::Debug for LoopWaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopWaker")
            .field("state", &self.subscription.lock().state)
            .finish()
    }
}

/// Frame loop bookkeeping around a display link
pub struct FrameLoop {
    subscription: Arc<Mutex<Subscription>>,
    default_interval_ms: f64,
    max_delta_ms: f64,
    last_host_ms: Option<f64>,
    now_ms: f64,
    frame: u64,
}

impl FrameLoop {
    /// Create an idle loop over `link`
    pub fn new(link: Box<dyn DisplayLink>, default_interval_ms: f64, max_delta_ms: f64) -> Self {
        Self {
            subscription: Arc::new(Mutex::new(Subscription {
                state: LoopState::Idle,
                link,
                restarted: false,
            })),
            default_interval_ms,
            max_delta_ms,
            last_host_ms: None,
            now_ms: 0.0,
            frame: 0,
        }
    }

    /// Handle for waking the loop from other threads
    pub fn waker(&self) -> LoopWaker {
        LoopWaker {
            subscription: Arc::clone(&self.subscription),
        }
    }

    /// Current state
    pub fn state(&self) -> LoopState {
        self.subscription.lock().state
    }

    /// Virtual time of the latest tick
    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    /// Ticks processed so far
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Subscribe to refresh ticks if not already subscribed
    pub fn start(&mut self) -> bool {
        let started = self.subscription.lock().start();
        if started {
            tracing::debug!(frame = self.frame, "frame loop started");
        }
        started
    }

    /// Unsubscribe; the next `start` resumes the virtual timeline
    pub fn stop(&mut self) -> bool {
        let stopped = self.subscription.lock().stop();
        if stopped {
            tracing::debug!(frame = self.frame, "frame loop idle");
        }
        stopped
    }

    /// Advance the virtual clock to host time `host_ms`.
    ///
    /// The first tick after a start advances by the default interval.
    /// Later ticks advance by the host delta clamped to `[0, max]`.
    pub fn tick(&mut self, host_ms: f64) -> FrameTiming {
        if std::mem::take(&mut self.subscription.lock().restarted) {
            self.last_host_ms = None;
        }
        let delta = match self.last_host_ms {
            None => self.default_interval_ms,
            Some(last) => {
                let raw = host_ms - last;
                if raw > self.max_delta_ms {
                    tracing::trace!(raw, max = self.max_delta_ms, "frame delta clamped");
                }
                raw.clamp(0.0, self.max_delta_ms)
            }
        };
        self.last_host_ms = Some(host_ms);
        self.now_ms += delta;
        self.frame += 1;
        FrameTiming {
            frame: self.frame,
            now_ms: self.now_ms,
            delta_ms: delta,
        }
    }
}

impl std::fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameLoop")
            .field("state", &self.state())
            .field("now_ms", &self.now_ms)
            .field("frame", &self.frame)
            .finish()
    }
}

#[derive(Debug, Default)]
struct LinkState {
    running: bool,
    starts: usize,
    stops: usize,
}

/// Display link driven by hand, for hosts that tick the engine themselves
#[derive(Debug, Clone, Default)]
pub struct ManualDisplayLink {
    state: Arc<Mutex<LinkState>>,
}

impl ManualDisplayLink {
    /// Create a stopped link
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether ticks are currently requested
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Number of start requests
    pub fn starts(&self) -> usize {
        self.state.lock().starts
    }

    /// Number of stop requests
    pub fn stops(&self) -> usize {
        self.state.lock().stops
    }
}

impl DisplayLink for ManualDisplayLink {
    fn start(&mut self) {
        let mut state = self.state.lock();
        state.running = true;
        state.starts += 1;
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        state.running = false;
        state.stops += 1;
    }
}
