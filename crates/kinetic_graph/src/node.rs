// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions for the animated graph.

use crate::expression::Expr;
use crate::graph::GraphError;
use crate::interpolation::{Extrapolate, InterpolationNode};
use crate::prop::PropMap;
use crate::transform::{TransformConfig, TransformEntry, TransformOperand};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeTag(pub u32);

impl fmt::Display for NodeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifier of a view on the rendering surface
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ViewId(pub u32);

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view {}", self.0)
    }
}

/// Identifier of a running animation driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnimationId(pub u32);

impl fmt::Display for AnimationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "animation {}", self.0)
    }
}

/// Operator folded over the inputs of an arithmetic node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArithmeticOp {
    /// Sum of all inputs
    Addition,
    /// First input minus the rest
    Subtraction,
    /// Product of all inputs
    Multiplication,
    /// First input divided by the rest
    Division,
    /// Euclidean-style modulus, folded left to right
    Modulus,
}

impl ArithmeticOp {
    /// Apply the operator to an accumulator and the next input.
    ///
    /// A zero divisor yields `0.0` instead of an infinity or NaN so that a
    /// frame evaluation always produces a finite value.
    pub fn apply(self, acc: f64, rhs: f64) -> f64 {
        match self {
            Self::Addition => acc + rhs,
            Self::Subtraction => acc - rhs,
            Self::Multiplication => acc * rhs,
            Self::Division => {
                if rhs == 0.0 {
                    tracing::trace!("division by zero resolved to 0");
                    0.0
                } else {
                    acc / rhs
                }
            }
            Self::Modulus => {
                if rhs == 0.0 {
                    tracing::trace!("modulus by zero resolved to 0");
                    0.0
                } else {
                    ((acc % rhs) + rhs) % rhs
                }
            }
        }
    }

    /// Fold the operator over the input values. No inputs yields `0.0`.
    pub fn fold(self, mut values: impl Iterator<Item = f64>) -> f64 {
        let Some(first) = values.next() else {
            return 0.0;
        };
        values.fold(first, |acc, v| self.apply(acc, v))
    }

    /// Config name of the operator
    pub fn name(self) -> &'static str {
        match self {
            Self::Addition => "addition",
            Self::Subtraction => "subtraction",
            Self::Multiplication => "multiplication",
            Self::Division => "division",
            Self::Modulus => "modulus",
        }
    }
}

/// Node configuration as received from the scripting side.
///
/// Configs are JSON objects tagged by `"type"`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum NodeConfig {
    /// Plain value holder
    Value {
        /// Initial base value
        #[serde(default)]
        value: f64,
        /// Initial offset
        #[serde(default)]
        offset: f64,
    },
    /// Style property name to node mapping
    Style {
        /// Style entries
        style: IndexMap<String, NodeTag>,
    },
    /// Ordered transform operations
    Transform {
        /// Transform entries
        transforms: Vec<TransformConfig>,
    },
    /// View-bound sink
    Props {
        /// Property entries
        props: IndexMap<String, NodeTag>,
    },
    /// Piecewise-linear mapping of one input
    #[serde(rename_all = "camelCase")]
    Interpolation {
        /// Input node, may be filled in by `connect`
        #[serde(default)]
        input: Option<NodeTag>,
        /// Input breakpoints
        input_range: Vec<f64>,
        /// Output breakpoints
        output_range: Vec<f64>,
        /// Policy for both sides
        #[serde(default)]
        extrapolate: Option<Extrapolate>,
        /// Policy below the first breakpoint
        #[serde(default)]
        extrapolate_left: Option<Extrapolate>,
        /// Policy above the last breakpoint
        #[serde(default)]
        extrapolate_right: Option<Extrapolate>,
    },
    /// Sum of inputs
    Addition {
        /// Input nodes
        #[serde(default)]
        input: Vec<NodeTag>,
    },
    /// Difference of inputs
    Subtraction {
        /// Input nodes
        #[serde(default)]
        input: Vec<NodeTag>,
    },
    /// Product of inputs
    Multiplication {
        /// Input nodes
        #[serde(default)]
        input: Vec<NodeTag>,
    },
    /// Quotient of inputs
    Division {
        /// Input nodes
        #[serde(default)]
        input: Vec<NodeTag>,
    },
    /// Modulus of inputs
    Modulus {
        /// Input nodes
        #[serde(default)]
        input: Vec<NodeTag>,
    },
    /// Bounded accumulation of input deltas
    #[serde(rename = "diffclamp")]
    DiffClamp {
        /// Input node, may be filled in by `connect`
        #[serde(default)]
        input: Option<NodeTag>,
        /// Lower bound
        min: f64,
        /// Upper bound
        max: f64,
    },
    /// Follows another node with an animation
    #[serde(rename_all = "camelCase")]
    Tracking {
        /// Animation id used for the follow-up driver
        animation_id: AnimationId,
        /// Node whose value is followed
        to_value: NodeTag,
        /// Node animated toward `to_value`
        value: NodeTag,
        /// Driver config template
        animation_config: serde_json::Value,
    },
    /// Expression tree
    Expression {
        /// Root of the tree
        graph: Expr,
    },
    /// Parameterised call of an expression node
    Proc {
        /// Expression node to evaluate
        expression: NodeTag,
        /// Nodes whose values are bound
        args: Vec<NodeTag>,
        /// Nodes receiving the bound values
        params: Vec<NodeTag>,
    },
}

impl NodeConfig {
    /// Parse a config from its JSON form
    pub fn from_json(value: &serde_json::Value) -> Result<Self, GraphError> {
        serde_json::from_value(value.clone()).map_err(|e| GraphError::InvalidConfig(e.to_string()))
    }
}

/// Inputs folded by an arithmetic operator
#[derive(Debug, Clone, PartialEq)]
pub struct ArithmeticNode {
    /// Operator
    pub op: ArithmeticOp,
    /// Ordered inputs
    pub inputs: Vec<NodeTag>,
}

/// Bounded accumulation of consecutive input deltas
#[derive(Debug, Clone, PartialEq)]
pub struct DiffClampNode {
    /// Input node
    pub input: Option<NodeTag>,
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
    /// Input seen on the previous evaluation
    pub last_input: Option<f64>,
}

impl DiffClampNode {
    /// Feed the next input value and return the new clamped value.
    ///
    /// The first evaluation only records the input.
    pub fn step(&mut self, current: f64, input: f64) -> f64 {
        let delta = match self.last_input {
            Some(last) => input - last,
            None => 0.0,
        };
        self.last_input = Some(input);
        (current + delta).clamp(self.min, self.max)
    }
}

/// Node that keeps another node animating toward a target
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingNode {
    /// Animation id for the spawned driver
    pub animation_id: AnimationId,
    /// Followed node, cleared when it is dropped or disconnected
    pub to_value: Option<NodeTag>,
    /// Animated node, cleared when it is dropped
    pub value: Option<NodeTag>,
    /// Driver config template, `toValue` is filled in on each evaluation
    pub animation_config: serde_json::Map<String, serde_json::Value>,
}

/// View-bound sink node
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PropsNode {
    /// Property name to source node
    pub props: IndexMap<String, NodeTag>,
    /// View this node is attached to
    pub view: Option<ViewId>,
    /// Last property map handed to the view
    pub last_sent: Option<PropMap>,
}

/// Expression node binding arguments into parameter nodes
#[derive(Debug, Clone, PartialEq)]
pub struct ProcNode {
    /// Expression node to evaluate
    pub expression: Option<NodeTag>,
    /// Argument nodes
    pub args: Vec<NodeTag>,
    /// Parameter nodes, paired with `args` by position
    pub params: Vec<NodeTag>,
}

/// Closed set of node kinds
#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    /// Plain value holder
    Value,
    /// Style entries
    Style(IndexMap<String, NodeTag>),
    /// Transform entries
    Transform(Vec<TransformEntry>),
    /// Interpolation of one input
    Interpolation(InterpolationNode),
    /// Arithmetic fold
    Arithmetic(ArithmeticNode),
    /// Diff-clamp
    DiffClamp(DiffClampNode),
    /// Tracking
    Tracking(TrackingNode),
    /// Props sink
    Props(PropsNode),
    /// Expression tree
    Expression(Expr),
    /// Procedure call
    Proc(ProcNode),
}

impl NodeKind {
    /// Config name of the kind
    pub fn name(&self) -> &'static str {
        match self {
            Self::Value => "value",
            Self::Style(_) => "style",
            Self::Transform(_) => "transform",
            Self::Interpolation(_) => "interpolation",
            Self::Arithmetic(node) => node.op.name(),
            Self::DiffClamp(_) => "diffclamp",
            Self::Tracking(_) => "tracking",
            Self::Props(_) => "props",
            Self::Expression(_) => "expression",
            Self::Proc(_) => "proc",
        }
    }
}

/// A node instance in the graph
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Node tag
    pub tag: NodeTag,
    /// Kind-specific state
    pub kind: NodeKind,
    value: f64,
    offset: f64,
}

impl Node {
    /// Create a node from its config, validating kind-specific fields
    pub fn from_config(tag: NodeTag, config: NodeConfig) -> Result<Self, GraphError> {
        let mut value = 0.0;
        let mut offset = 0.0;
        let kind = match config {
            NodeConfig::Value { value: v, offset: o } => {
                value = v;
                offset = o;
                NodeKind::Value
            }
            NodeConfig::Style { style } => NodeKind::Style(style),
            NodeConfig::Transform { transforms } => NodeKind::Transform(
                transforms
                    .into_iter()
                    .map(TransformEntry::from_config)
                    .collect::<Result<_, _>>()?,
            ),
            NodeConfig::Props { props } => NodeKind::Props(PropsNode {
                props,
                ..PropsNode::default()
            }),
            NodeConfig::Interpolation {
                input,
                input_range,
                output_range,
                extrapolate,
                extrapolate_left,
                extrapolate_right,
            } => {
                let both = extrapolate.unwrap_or_default();
                NodeKind::Interpolation(InterpolationNode::new(
                    input,
                    input_range,
                    output_range,
                    extrapolate_left.unwrap_or(both),
                    extrapolate_right.unwrap_or(both),
                )?)
            }
            NodeConfig::Addition { input } => arithmetic(ArithmeticOp::Addition, input),
            NodeConfig::Subtraction { input } => arithmetic(ArithmeticOp::Subtraction, input),
            NodeConfig::Multiplication { input } => arithmetic(ArithmeticOp::Multiplication, input),
            NodeConfig::Division { input } => arithmetic(ArithmeticOp::Division, input),
            NodeConfig::Modulus { input } => arithmetic(ArithmeticOp::Modulus, input),
            NodeConfig::DiffClamp { input, min, max } => {
                if min.is_nan() || max.is_nan() || min > max {
                    return Err(GraphError::InvalidConfig(format!(
                        "diffclamp min {min} must not exceed max {max}"
                    )));
                }
                NodeKind::DiffClamp(DiffClampNode {
                    input,
                    min,
                    max,
                    last_input: None,
                })
            }
            NodeConfig::Tracking {
                animation_id,
                to_value,
                value,
                animation_config,
            } => {
                let serde_json::Value::Object(animation_config) = animation_config else {
                    return Err(GraphError::InvalidConfig(
                        "tracking animationConfig must be an object".to_string(),
                    ));
                };
                NodeKind::Tracking(TrackingNode {
                    animation_id,
                    to_value: Some(to_value),
                    value: Some(value),
                    animation_config,
                })
            }
            NodeConfig::Expression { graph } => NodeKind::Expression(graph),
            NodeConfig::Proc {
                expression,
                args,
                params,
            } => {
                if args.len() != params.len() {
                    return Err(GraphError::InvalidConfig(format!(
                        "proc has {} args but {} params",
                        args.len(),
                        params.len()
                    )));
                }
                NodeKind::Proc(ProcNode {
                    expression: Some(expression),
                    args,
                    params,
                })
            }
        };

        Ok(Self {
            tag,
            kind,
            value,
            offset,
        })
    }

    /// Observed value: base plus offset
    pub fn value(&self) -> f64 {
        self.value + self.offset
    }

    /// Base value without the offset
    pub fn base_value(&self) -> f64 {
        self.value
    }

    /// Current offset
    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Set the base value. Returns whether it changed.
    pub fn set_base_value(&mut self, value: f64) -> bool {
        let changed = self.value.to_bits() != value.to_bits();
        self.value = value;
        changed
    }

    /// Set the offset. Returns whether it changed.
    pub fn set_offset(&mut self, offset: f64) -> bool {
        let changed = self.offset.to_bits() != offset.to_bits();
        self.offset = offset;
        changed
    }

    /// Merge the offset into the base value and reset the offset
    pub fn flatten_offset(&mut self) {
        self.value += self.offset;
        self.offset = 0.0;
    }

    /// Move the base value into the offset; the observed value is unchanged
    pub fn extract_offset(&mut self) {
        self.offset += self.value;
        self.value = 0.0;
    }

    /// Whether the node holds a scalar value that can be set or animated
    pub fn holds_value(&self) -> bool {
        !matches!(
            self.kind,
            NodeKind::Style(_) | NodeKind::Transform(_) | NodeKind::Props(_)
        )
    }

    /// Whether the node is a view-bound sink
    pub fn is_sink(&self) -> bool {
        matches!(self.kind, NodeKind::Props(_))
    }

    /// Record `child` as an input after `connect`.
    ///
    /// Arithmetic nodes append it; single-input nodes take it when unset.
    pub fn attach_input(&mut self, child: NodeTag) {
        match &mut self.kind {
            NodeKind::Arithmetic(node) => {
                if !node.inputs.contains(&child) {
                    node.inputs.push(child);
                }
            }
            NodeKind::Interpolation(node) => {
                node.input.get_or_insert(child);
            }
            NodeKind::DiffClamp(node) => {
                if node.input.is_none() {
                    node.input = Some(child);
                    node.last_input = None;
                }
            }
            NodeKind::Tracking(node) => {
                node.to_value.get_or_insert(child);
            }
            _ => {}
        }
    }

    /// Remove every reference to `child` held by this node
    pub fn forget_input(&mut self, child: NodeTag) {
        match &mut self.kind {
            NodeKind::Arithmetic(node) => node.inputs.retain(|t| *t != child),
            NodeKind::Interpolation(node) => {
                if node.input == Some(child) {
                    node.input = None;
                }
            }
            NodeKind::DiffClamp(node) => {
                if node.input == Some(child) {
                    node.input = None;
                    node.last_input = None;
                }
            }
            NodeKind::Style(style) => style.retain(|_, t| *t != child),
            NodeKind::Props(props) => props.props.retain(|_, t| *t != child),
            NodeKind::Transform(entries) => {
                entries.retain(|e| e.operand != TransformOperand::Animated(child));
            }
            NodeKind::Proc(node) => {
                if node.expression == Some(child) {
                    node.expression = None;
                }
                let pairs: Vec<(NodeTag, NodeTag)> = node
                    .args
                    .iter()
                    .copied()
                    .zip(node.params.iter().copied())
                    .filter(|(a, p)| *a != child && *p != child)
                    .collect();
                (node.args, node.params) = pairs.into_iter().unzip();
            }
            NodeKind::Tracking(node) => {
                if node.to_value == Some(child) {
                    node.to_value = None;
                }
                if node.value == Some(child) {
                    node.value = None;
                }
            }
            NodeKind::Expression(expr) => expr.forget(child),
            NodeKind::Value => {}
        }
    }

    /// Tags this node reads from
    pub fn input_refs(&self) -> Vec<NodeTag> {
        match &self.kind {
            NodeKind::Value => Vec::new(),
            NodeKind::Style(style) => style.values().copied().collect(),
            NodeKind::Transform(entries) => entries
                .iter()
                .filter_map(|e| match e.operand {
                    TransformOperand::Animated(tag) => Some(tag),
                    TransformOperand::Static(_) => None,
                })
                .collect(),
            NodeKind::Interpolation(node) => node.input.into_iter().collect(),
            NodeKind::Arithmetic(node) => node.inputs.clone(),
            NodeKind::DiffClamp(node) => node.input.into_iter().collect(),
            NodeKind::Tracking(node) => node.to_value.into_iter().collect(),
            NodeKind::Props(props) => props.props.values().copied().collect(),
            NodeKind::Expression(expr) => expr.referenced_tags(),
            NodeKind::Proc(node) => node
                .args
                .iter()
                .chain(node.expression.iter())
                .copied()
                .collect(),
        }
    }
}

fn arithmetic(op: ArithmeticOp, inputs: Vec<NodeTag>) -> NodeKind {
    NodeKind::Arithmetic(ArithmeticNode { op, inputs })
}
