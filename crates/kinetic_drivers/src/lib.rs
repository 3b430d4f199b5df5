// SPDX-License-Identifier: MIT OR Apache-2.0
//! Animation drivers for Kinetic.
//!
//! This crate provides the time-stepped drivers that move value nodes:
//! - Timing curves with easing or precomputed frame tables
//! - Closed-form damped springs
//! - Velocity decay
//! - A clock that follows frame time
//!
//! ## Architecture
//!
//! Each active animation is a [`Driver`] bound to one target node by tag.
//! The [`DriverSet`] steps every driver once per frame against a
//! [`kinetic_graph::NodeGraph`], arbitrates writes to shared targets and
//! hands back the completions of drivers that reached a terminal state.

pub mod config;
pub mod driver;
pub mod easing;
pub mod timing;
pub mod spring;
pub mod decay;
pub mod clock;
pub mod set;

pub use config::{DriverConfig, Iterations};
pub use driver::{
    Animation, AnimationEnd, Completion, CompletionCallback, Driver, DriverState, FrameTime, Sample,
};
pub use timing::{TimingAnimation, TimingCurve};
pub use spring::SpringAnimation;
pub use decay::DecayAnimation;
pub use clock::ClockAnimation;
pub use easing::{CubicBezier, Easing};
pub use set::{Arbitration, DriverError, DriverSet, StepReport};
