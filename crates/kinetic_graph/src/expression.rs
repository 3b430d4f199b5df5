// SPDX-License-Identifier: MIT OR Apache-2.0
//! Expression trees evaluated by expression and proc nodes.
//!
//! Trees arrive as nested JSON objects tagged by `"type"`. Every expression
//! evaluates to a number; logical operators treat any non-zero value as true
//! and produce `1.0` or `0.0`.

use crate::node::NodeTag;
use indexmap::IndexMap;
use serde::Deserialize;

/// Operators folded over `a`, `b` and `others`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NaryOp {
    /// Sum
    Add,
    /// Difference
    Sub,
    /// Product
    Multiply,
    /// Quotient; zero divisor yields 0
    Divide,
    /// Modulus with the sign of the divisor; zero divisor yields 0
    Modulo,
    /// Power
    Pow,
    /// Logical and
    And,
    /// Logical or
    Or,
}

impl NaryOp {
    fn apply(self, acc: f64, rhs: f64) -> f64 {
        match self {
            Self::Add => acc + rhs,
            Self::Sub => acc - rhs,
            Self::Multiply => acc * rhs,
            Self::Divide | Self::Modulo if rhs == 0.0 => 0.0,
            Self::Divide => acc / rhs,
            Self::Modulo => ((acc % rhs) + rhs) % rhs,
            Self::Pow => acc.powf(rhs),
            Self::And => truth(is_true(acc) && is_true(rhs)),
            Self::Or => truth(is_true(acc) || is_true(rhs)),
        }
    }
}

/// Single-operand functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Square root
    Sqrt,
    /// Natural logarithm
    Log,
    /// Sine
    Sin,
    /// Cosine
    Cos,
    /// Tangent
    Tan,
    /// Arc cosine
    Acos,
    /// Arc sine
    Asin,
    /// Arc tangent
    Atan,
    /// Exponential
    Exp,
    /// Round half up
    Round,
    /// Absolute value
    Abs,
    /// Logical not
    Not,
}

impl UnaryOp {
    fn apply(self, v: f64) -> f64 {
        match self {
            Self::Sqrt => v.sqrt(),
            Self::Log => v.ln(),
            Self::Sin => v.sin(),
            Self::Cos => v.cos(),
            Self::Tan => v.tan(),
            Self::Acos => v.acos(),
            Self::Asin => v.asin(),
            Self::Atan => v.atan(),
            Self::Exp => v.exp(),
            Self::Round => (v + 0.5).floor(),
            Self::Abs => v.abs(),
            Self::Not => truth(!is_true(v)),
        }
    }
}

/// Binary comparisons
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    /// `left == right`
    Eq,
    /// `left != right`
    Neq,
    /// `left < right`
    LessThan,
    /// `left > right`
    GreaterThan,
    /// `left <= right`
    LessOrEq,
    /// `left >= right`
    GreaterOrEq,
}

impl CompareOp {
    fn apply(self, left: f64, right: f64) -> f64 {
        truth(match self {
            Self::Eq => left == right,
            Self::Neq => left != right,
            Self::LessThan => left < right,
            Self::GreaterThan => left > right,
            Self::LessOrEq => left <= right,
            Self::GreaterOrEq => left >= right,
        })
    }
}

/// An expression tree
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "RawExpr")]
pub enum Expr {
    /// Left fold of an operator over at least two operands
    Nary(NaryOp, Vec<Expr>),
    /// Function of one operand
    Unary(UnaryOp, Box<Expr>),
    /// Comparison
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    /// Observed value of a node; unknown nodes read as 0
    Value(NodeTag),
    /// Literal
    Number(f64),
    /// Conditional; a missing else branch yields 0
    Cond {
        /// Condition
        test: Box<Expr>,
        /// Taken when the condition is non-zero
        then: Box<Expr>,
        /// Taken otherwise
        otherwise: Option<Box<Expr>>,
    },
    /// Write `source` into the base value of `target`; yields the written value
    Set {
        /// Node receiving the value
        target: NodeTag,
        /// Value to write
        source: Box<Expr>,
    },
    /// Evaluate in order; yields the last value, or 0 when empty
    Block(Vec<Expr>),
}

/// Result of evaluating a tree
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ExprOutcome {
    /// Value of the root
    pub value: f64,
    /// `set` writes in evaluation order
    pub writes: Vec<(NodeTag, f64)>,
}

struct Scope<'a> {
    read: &'a dyn Fn(NodeTag) -> Option<f64>,
    overlay: IndexMap<NodeTag, f64>,
    writes: Vec<(NodeTag, f64)>,
}

impl Scope<'_> {
    fn read(&self, tag: NodeTag) -> f64 {
        self.overlay
            .get(&tag)
            .copied()
            .or_else(|| (self.read)(tag))
            .unwrap_or(0.0)
    }
}

impl Expr {
    /// Evaluate the tree, reading node values through `read`.
    ///
    /// `set` writes are not applied to the graph; they are returned in the
    /// outcome and are visible to later reads within the same evaluation.
    pub fn evaluate(&self, read: &dyn Fn(NodeTag) -> Option<f64>) -> ExprOutcome {
        let mut scope = Scope {
            read,
            overlay: IndexMap::new(),
            writes: Vec::new(),
        };
        let value = self.eval(&mut scope);
        ExprOutcome {
            value,
            writes: scope.writes,
        }
    }

    fn eval(&self, scope: &mut Scope<'_>) -> f64 {
        match self {
            Self::Nary(op, operands) => {
                let mut iter = operands.iter();
                let Some(first) = iter.next() else {
                    return 0.0;
                };
                let mut acc = first.eval(scope);
                for operand in iter {
                    let rhs = operand.eval(scope);
                    acc = op.apply(acc, rhs);
                }
                acc
            }
            Self::Unary(op, v) => op.apply(v.eval(scope)),
            Self::Compare(op, left, right) => {
                let l = left.eval(scope);
                let r = right.eval(scope);
                op.apply(l, r)
            }
            Self::Value(tag) => scope.read(*tag),
            Self::Number(v) => *v,
            Self::Cond {
                test,
                then,
                otherwise,
            } => {
                if is_true(test.eval(scope)) {
                    then.eval(scope)
                } else {
                    otherwise.as_ref().map_or(0.0, |e| e.eval(scope))
                }
            }
            Self::Set { target, source } => {
                let value = source.eval(scope);
                scope.overlay.insert(*target, value);
                scope.writes.push((*target, value));
                value
            }
            Self::Block(nodes) => {
                let mut last = 0.0;
                for node in nodes {
                    last = node.eval(scope);
                }
                last
            }
        }
    }

    /// Every node tag read or written by the tree, first occurrence order
    pub fn referenced_tags(&self) -> Vec<NodeTag> {
        let mut tags = Vec::new();
        self.collect_tags(&mut tags);
        tags
    }

    /// Remove every reference to `tag`.
    ///
    /// Reads of it become the literal 0 it would read as once gone, and
    /// writes to it keep only their source.
    pub fn forget(&mut self, tag: NodeTag) {
        match self {
            Self::Value(t) if *t == tag => *self = Self::Number(0.0),
            Self::Set { target, source } if *target == tag => {
                source.forget(tag);
                let source = std::mem::replace(source.as_mut(), Self::Number(0.0));
                *self = source;
            }
            Self::Set { source, .. } | Self::Unary(_, source) => source.forget(tag),
            Self::Nary(_, operands) | Self::Block(operands) => {
                for operand in operands {
                    operand.forget(tag);
                }
            }
            Self::Compare(_, left, right) => {
                left.forget(tag);
                right.forget(tag);
            }
            Self::Cond {
                test,
                then,
                otherwise,
            } => {
                test.forget(tag);
                then.forget(tag);
                if let Some(otherwise) = otherwise {
                    otherwise.forget(tag);
                }
            }
            Self::Value(_) | Self::Number(_) => {}
        }
    }

    fn collect_tags(&self, tags: &mut Vec<NodeTag>) {
        self.walk(&mut |expr| {
            let tag = match expr {
                Self::Value(tag) | Self::Set { target: tag, .. } => *tag,
                _ => return,
            };
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        });
    }

    fn walk(&self, visit: &mut dyn FnMut(&Expr)) {
        visit(self);
        match self {
            Self::Nary(_, operands) | Self::Block(operands) => {
                for operand in operands {
                    operand.walk(visit);
                }
            }
            Self::Unary(_, v) => v.walk(visit),
            Self::Compare(_, left, right) => {
                left.walk(visit);
                right.walk(visit);
            }
            Self::Cond {
                test,
                then,
                otherwise,
            } => {
                test.walk(visit);
                then.walk(visit);
                if let Some(otherwise) = otherwise {
                    otherwise.walk(visit);
                }
            }
            Self::Set { source, .. } => source.walk(visit),
            Self::Value(_) | Self::Number(_) => {}
        }
    }
}

fn is_true(v: f64) -> bool {
    v != 0.0
}

fn truth(b: bool) -> f64 {
    if b {
        1.0
    } else {
        0.0
    }
}

#[derive(Deserialize)]
struct NaryFields {
    a: Expr,
    b: Expr,
    #[serde(default)]
    others: Vec<Expr>,
}

#[derive(Deserialize)]
struct UnaryFields {
    v: Box<Expr>,
}

#[derive(Deserialize)]
struct CompareFields {
    left: Box<Expr>,
    right: Box<Expr>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum RawExpr {
    Add(NaryFields),
    Sub(NaryFields),
    Multiply(NaryFields),
    Divide(NaryFields),
    Modulo(NaryFields),
    Pow(NaryFields),
    And(NaryFields),
    Or(NaryFields),
    Sqrt(UnaryFields),
    Log(UnaryFields),
    Sin(UnaryFields),
    Cos(UnaryFields),
    Tan(UnaryFields),
    Acos(UnaryFields),
    Asin(UnaryFields),
    Atan(UnaryFields),
    Exp(UnaryFields),
    Round(UnaryFields),
    Abs(UnaryFields),
    Not(UnaryFields),
    Eq(CompareFields),
    Neq(CompareFields),
    LessThan(CompareFields),
    GreaterThan(CompareFields),
    LessOrEq(CompareFields),
    GreaterOrEq(CompareFields),
    Value {
        tag: NodeTag,
    },
    Number {
        value: f64,
    },
    #[serde(rename_all = "camelCase")]
    Cond {
        expr: Box<Expr>,
        if_node: Box<Expr>,
        #[serde(default)]
        else_node: Option<Box<Expr>>,
    },
    Set {
        target: NodeTag,
        source: Box<Expr>,
    },
    Block {
        nodes: Vec<Expr>,
    },
}

impl From<RawExpr> for Expr {
    fn from(raw: RawExpr) -> Self {
        let nary = |op: NaryOp, f: NaryFields| {
            let mut operands = Vec::with_capacity(2 + f.others.len());
            operands.push(f.a);
            operands.push(f.b);
            operands.extend(f.others);
            Expr::Nary(op, operands)
        };
        let compare = |op: CompareOp, f: CompareFields| Expr::Compare(op, f.left, f.right);

        match raw {
            RawExpr::Add(f) => nary(NaryOp::Add, f),
            RawExpr::Sub(f) => nary(NaryOp::Sub, f),
            RawExpr::Multiply(f) => nary(NaryOp::Multiply, f),
            RawExpr::Divide(f) => nary(NaryOp::Divide, f),
            RawExpr::Modulo(f) => nary(NaryOp::Modulo, f),
            RawExpr::Pow(f) => nary(NaryOp::Pow, f),
            RawExpr::And(f) => nary(NaryOp::And, f),
            RawExpr::Or(f) => nary(NaryOp::Or, f),
            RawExpr::Sqrt(f) => Expr::Unary(UnaryOp::Sqrt, f.v),
            RawExpr::Log(f) => Expr::Unary(UnaryOp::Log, f.v),
            RawExpr::Sin(f) => Expr::Unary(UnaryOp::Sin, f.v),
            RawExpr::Cos(f) => Expr::Unary(UnaryOp::Cos, f.v),
            RawExpr::Tan(f) => Expr::Unary(UnaryOp::Tan, f.v),
            RawExpr::Acos(f) => Expr::Unary(UnaryOp::Acos, f.v),
            RawExpr::Asin(f) => Expr::Unary(UnaryOp::Asin, f.v),
            RawExpr::Atan(f) => Expr::Unary(UnaryOp::Atan, f.v),
            RawExpr::Exp(f) => Expr::Unary(UnaryOp::Exp, f.v),
            RawExpr::Round(f) => Expr::Unary(UnaryOp::Round, f.v),
            RawExpr::Abs(f) => Expr::Unary(UnaryOp::Abs, f.v),
            RawExpr::Not(f) => Expr::Unary(UnaryOp::Not, f.v),
            RawExpr::Eq(f) => compare(CompareOp::Eq, f),
            RawExpr::Neq(f) => compare(CompareOp::Neq, f),
            RawExpr::LessThan(f) => compare(CompareOp::LessThan, f),
            RawExpr::GreaterThan(f) => compare(CompareOp::GreaterThan, f),
            RawExpr::LessOrEq(f) => compare(CompareOp::LessOrEq, f),
            RawExpr::GreaterOrEq(f) => compare(CompareOp::GreaterOrEq, f),
            RawExpr::Value { tag } => Expr::Value(tag),
            RawExpr::Number { value } => Expr::Number(value),
            RawExpr::Cond {
                expr,
                if_node,
                else_node,
            } => Expr::Cond {
                test: expr,
                then: if_node,
                otherwise: else_node,
            },
            RawExpr::Set { target, source } => Expr::Set { target, source },
            RawExpr::Block { nodes } => Expr::Block(nodes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: serde_json::Value) -> Expr {
        serde_json::from_value(value).unwrap()
    }

    fn no_nodes(_: NodeTag) -> Option<f64> {
        None
    }

    #[test]
    fn test_arithmetic_and_others() {
        let expr = parse(json!({
            "type": "sub",
            "a": {"type": "number", "value": 10},
            "b": {"type": "number", "value": 3},
            "others": [{"type": "number", "value": 2}],
        }));
        assert_eq!(expr.evaluate(&no_nodes).value, 5.0);

        let expr = parse(json!({
            "type": "modulo",
            "a": {"type": "number", "value": -1},
            "b": {"type": "number", "value": 3},
        }));
        assert_eq!(expr.evaluate(&no_nodes).value, 2.0);

        let expr = parse(json!({
            "type": "divide",
            "a": {"type": "number", "value": 1},
            "b": {"type": "number", "value": 0},
        }));
        assert_eq!(expr.evaluate(&no_nodes).value, 0.0);
    }

    #[test]
    fn test_conditionals_and_logic() {
        let expr = parse(json!({
            "type": "cond",
            "expr": {
                "type": "and",
                "a": {"type": "greaterThan", "left": {"type": "value", "tag": 1}, "right": {"type": "number", "value": 0}},
                "b": {"type": "not", "v": {"type": "number", "value": 0}},
            },
            "ifNode": {"type": "number", "value": 7},
            "elseNode": {"type": "number", "value": 9},
        }));
        let read = |tag: NodeTag| (tag == NodeTag(1)).then_some(4.0);
        assert_eq!(expr.evaluate(&read).value, 7.0);
        assert_eq!(expr.evaluate(&no_nodes).value, 9.0);
    }

    #[test]
    fn test_round_half_up() {
        let expr = parse(json!({"type": "round", "v": {"type": "number", "value": -2.5}}));
        assert_eq!(expr.evaluate(&no_nodes).value, -2.0);
        let expr = parse(json!({"type": "round", "v": {"type": "number", "value": 2.5}}));
        assert_eq!(expr.evaluate(&no_nodes).value, 3.0);
    }

    #[test]
    fn test_set_is_visible_to_later_reads() {
        let expr = parse(json!({
            "type": "block",
            "nodes": [
                {"type": "set", "target": 2, "source": {"type": "number", "value": 11}},
                {"type": "add", "a": {"type": "value", "tag": 2}, "b": {"type": "number", "value": 1}},
            ],
        }));
        let read = |_: NodeTag| Some(0.0);
        let outcome = expr.evaluate(&read);
        assert_eq!(outcome.value, 12.0);
        assert_eq!(outcome.writes, vec![(NodeTag(2), 11.0)]);
        assert_eq!(expr.referenced_tags(), vec![NodeTag(2)]);
    }

    #[test]
    fn test_forget_removes_reads_and_writes() {
        let mut expr = parse(json!({
            "type": "block",
            "nodes": [
                {"type": "set", "target": 2, "source": {"type": "value", "tag": 3}},
                {"type": "multiply", "a": {"type": "value", "tag": 2}, "b": {"type": "value", "tag": 3}},
            ],
        }));
        expr.forget(NodeTag(2));
        assert_eq!(expr.referenced_tags(), vec![NodeTag(3)]);

        let read = |t: NodeTag| (t == NodeTag(3)).then_some(4.0);
        let outcome = expr.evaluate(&read);
        assert!(outcome.writes.is_empty());
        assert_eq!(outcome.value, 0.0);
    }

    #[test]
    fn test_unknown_type_rejected() {
        let result: Result<Expr, _> = serde_json::from_value(json!({"type": "lerp"}));
        assert!(result.is_err());
    }
}
