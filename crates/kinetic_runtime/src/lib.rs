// SPDX-License-Identifier: MIT OR Apache-2.0
//! Kinetic runtime.
//!
//! Owns the animated node graph on a single context and connects it to the
//! host:
//! - [`NodesManager`] applies graph operations, steps drivers each display
//!   refresh and flushes one batch of view updates per tick
//! - [`AnimatedModule`] lets other threads enqueue operations without
//!   blocking
//! - [`EventRouter`] writes native event payload fields into value nodes
//! - [`ViewUpdater`], [`DisplayLink`] and [`ValueObserver`] are the seams the
//!   host implements
//!
//! ## Architecture
//!
//! Nothing in the graph is locked. Cross-thread calls are messages drained
//! by the owning context at the start of every tick, and the frame loop only
//! subscribes to refresh ticks while there is work to do.

pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod frame_loop;
pub mod manager;
pub mod observer;
pub mod view;

pub use commands::{AnimatedModule, Command, CommandFailure};
pub use config::EngineConfig;
pub use error::{AnimatedError, ConfigError};
pub use events::{EventDispatch, EventMapping, EventPath, EventRouter, PayloadShapeError};
pub use frame_loop::{DisplayLink, FrameLoop, FrameTiming, LoopState, LoopWaker, ManualDisplayLink};
pub use manager::{FrameReport, NodesManager};
pub use observer::{ObserverRegistry, ValueObserver};
pub use view::{FrameBatch, RecordingViewUpdater, ViewUpdater};
