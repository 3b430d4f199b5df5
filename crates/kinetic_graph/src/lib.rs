// SPDX-License-Identifier: MIT OR Apache-2.0
//! Animated node graph for Kinetic.
//!
//! This crate provides the value-computation graph that drives animated
//! view properties:
//! - Value nodes with base value and offset
//! - Arithmetic, interpolation, diff-clamp and expression nodes
//! - Style, transform and props nodes that aggregate values for a view
//! - Tracking nodes that request follow-up animations
//!
//! ## Architecture
//!
//! Nodes live in a tag-indexed arena owned by [`NodeGraph`]. Edges are kept
//! as tag sets in both directions so that a change can be propagated to the
//! affected subgraph only, in dependency order, without walking the whole
//! graph.

pub mod node;
pub mod prop;
pub mod connection;
pub mod graph;
pub mod evaluation;
pub mod interpolation;
pub mod expression;
pub mod transform;

pub use node::{AnimationId, ArithmeticOp, Node, NodeConfig, NodeKind, NodeTag, ViewId};
pub use prop::{PropMap, PropValue, TransformValue};
pub use connection::{Adjacency, Connection};
pub use graph::{GraphError, NodeGraph, TagHolder};
pub use evaluation::{PropagationOutcome, TrackingRequest};
pub use interpolation::{Extrapolate, InterpolationNode};
pub use expression::{CompareOp, Expr, ExprOutcome, NaryOp, UnaryOp};
pub use transform::{TransformEntry, TransformOperand, TransformProperty};
