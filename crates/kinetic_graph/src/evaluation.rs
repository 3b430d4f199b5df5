// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value propagation over the affected subgraph.

use crate::graph::{GraphError, NodeGraph};
use crate::node::{AnimationId, NodeKind, NodeTag, ProcNode, ViewId};
use crate::prop::{PropMap, PropValue, TransformValue};
use crate::transform::TransformOperand;
use indexmap::{IndexMap, IndexSet};
use std::collections::VecDeque;

/// A tracking node asking for a driver toward its followed value
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingRequest {
    /// Animation id to (re)start
    pub animation_id: AnimationId,
    /// Node to animate
    pub target: NodeTag,
    /// Driver config with `toValue` filled in
    pub config: serde_json::Value,
}

/// Result of one propagation pass
#[derive(Debug, Clone, Default)]
pub struct PropagationOutcome {
    /// Nodes evaluated, in evaluation order
    pub recomputed: Vec<NodeTag>,
    /// Props sinks reached by the pass
    pub touched_sinks: IndexSet<NodeTag>,
    /// Deferred expression `set` writes
    pub writes: Vec<(NodeTag, f64)>,
    /// Drivers requested by tracking nodes
    pub tracking: Vec<TrackingRequest>,
}

impl PropagationOutcome {
    /// Whether the pass did nothing
    pub fn is_empty(&self) -> bool {
        self.recomputed.is_empty()
    }

    /// Fold a later pass into this one
    pub fn merge(&mut self, other: PropagationOutcome) {
        self.recomputed.extend(other.recomputed);
        self.touched_sinks.extend(other.touched_sinks);
        self.writes.extend(other.writes);
        self.tracking.extend(other.tracking);
    }
}

enum Step {
    Keep,
    Set(f64),
    DiffClamp(f64),
    Proc(ProcNode),
}

impl NodeGraph {
    /// Recompute everything that depends on the nodes marked since the last
    /// pass.
    ///
    /// Only the marked nodes and their transitive dependents are evaluated,
    /// each exactly once and after all of its affected inputs.
    pub fn propagate(&mut self) -> PropagationOutcome {
        let roots = std::mem::take(&mut self.updated);
        let mut outcome = PropagationOutcome::default();
        if roots.is_empty() {
            return outcome;
        }

        for tag in self.affected_order(&roots) {
            self.evaluate_node(tag, &mut outcome);
            outcome.recomputed.push(tag);
        }
        tracing::trace!(
            roots = roots.len(),
            recomputed = outcome.recomputed.len(),
            sinks = outcome.touched_sinks.len(),
            "propagated"
        );
        outcome
    }

    /// Topological order of `roots` and their ancestors
    fn affected_order(&self, roots: &IndexSet<NodeTag>) -> Vec<NodeTag> {
        // Phase 1: collect the affected set
        let mut affected: IndexSet<NodeTag> = IndexSet::new();
        let mut queue: VecDeque<NodeTag> = roots
            .iter()
            .copied()
            .filter(|t| self.nodes.contains_key(t))
            .collect();
        while let Some(tag) = queue.pop_front() {
            if !affected.insert(tag) {
                continue;
            }
            queue.extend(self.edges.parents_of(tag));
        }

        // Phase 2: release a node once all of its affected inputs are done
        let mut pending: IndexMap<NodeTag, usize> = affected
            .iter()
            .map(|tag| {
                let count = self
                    .edges
                    .children_of(*tag)
                    .filter(|c| affected.contains(c))
                    .count();
                (*tag, count)
            })
            .collect();
        let mut ready: VecDeque<NodeTag> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(tag, _)| *tag)
            .collect();

        let mut order = Vec::with_capacity(affected.len());
        while let Some(tag) = ready.pop_front() {
            order.push(tag);
            for parent in self.edges.parents_of(tag) {
                if let Some(count) = pending.get_mut(&parent) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push_back(parent);
                    }
                }
            }
        }

        if order.len() != affected.len() {
            tracing::error!(
                affected = affected.len(),
                ordered = order.len(),
                "cycle in affected subgraph, skipping unordered nodes"
            );
        }
        order
    }

    fn evaluate_node(&mut self, tag: NodeTag, outcome: &mut PropagationOutcome) {
        let Some(node) = self.nodes.get(&tag) else {
            return;
        };

        let step = match &node.kind {
            NodeKind::Value | NodeKind::Style(_) | NodeKind::Transform(_) => Step::Keep,
            NodeKind::Props(_) => {
                outcome.touched_sinks.insert(tag);
                Step::Keep
            }
            NodeKind::Interpolation(interpolation) => match interpolation.input {
                Some(input) => Step::Set(interpolation.evaluate(self.read(input))),
                None => Step::Keep,
            },
            NodeKind::Arithmetic(arithmetic) => Step::Set(
                arithmetic
                    .op
                    .fold(arithmetic.inputs.iter().filter_map(|t| self.value_of(*t))),
            ),
            NodeKind::DiffClamp(clamp) => match clamp.input {
                Some(input) => Step::DiffClamp(self.read(input)),
                None => Step::Keep,
            },
            NodeKind::Tracking(tracking) => {
                if let (Some(to_value), Some(target)) = (tracking.to_value, tracking.value) {
                    let mut config = tracking.animation_config.clone();
                    config.insert("toValue".to_string(), serde_json::json!(self.read(to_value)));
                    outcome.tracking.push(TrackingRequest {
                        animation_id: tracking.animation_id,
                        target,
                        config: serde_json::Value::Object(config),
                    });
                }
                Step::Keep
            }
            NodeKind::Expression(expr) => {
                let result = expr.evaluate(&|t: NodeTag| self.value_of(t));
                outcome.writes.extend(result.writes);
                Step::Set(result.value)
            }
            NodeKind::Proc(proc) => Step::Proc(proc.clone()),
        };

        match step {
            Step::Keep => {}
            Step::Set(value) => self.store(tag, value),
            Step::DiffClamp(input) => {
                if let Some(node) = self.nodes.get_mut(&tag) {
                    let current = node.base_value();
                    if let NodeKind::DiffClamp(clamp) = &mut node.kind {
                        let next = clamp.step(current, input);
                        node.set_base_value(next);
                    }
                }
            }
            Step::Proc(proc) => self.evaluate_proc(tag, &proc, outcome),
        }
    }

    fn evaluate_proc(&mut self, tag: NodeTag, proc: &ProcNode, outcome: &mut PropagationOutcome) {
        let bound: Vec<(NodeTag, f64)> = proc
            .args
            .iter()
            .zip(&proc.params)
            .map(|(arg, param)| (*param, self.read(*arg)))
            .collect();
        for (param, value) in bound {
            if let Some(node) = self.nodes.get_mut(&param) {
                if node.holds_value() {
                    node.set_base_value(value);
                }
            }
        }

        let Some(expression) = proc.expression else {
            return;
        };
        let result = match self.nodes.get(&expression).map(|n| &n.kind) {
            Some(NodeKind::Expression(expr)) => expr.evaluate(&|t: NodeTag| self.value_of(t)),
            _ => {
                tracing::warn!(%tag, %expression, "proc does not reference an expression node");
                return;
            }
        };
        outcome.writes.extend(result.writes);
        self.store(expression, result.value);
        self.store(tag, result.value);
    }

    fn store(&mut self, tag: NodeTag, value: f64) {
        if let Some(node) = self.nodes.get_mut(&tag) {
            node.set_base_value(value);
        }
    }

    /// Observed value of a node, if it exists
    pub fn value_of(&self, tag: NodeTag) -> Option<f64> {
        self.nodes.get(&tag).map(|n| n.value())
    }

    fn read(&self, tag: NodeTag) -> f64 {
        self.value_of(tag).unwrap_or(0.0)
    }

    /// Apply deferred expression writes, marking every node that changed.
    ///
    /// Returns how many nodes changed.
    pub fn apply_writes(&mut self, writes: &[(NodeTag, f64)]) -> usize {
        let mut changed = 0;
        for (tag, value) in writes {
            match self.set_base_value(*tag, *value) {
                Ok(true) => changed += 1,
                Ok(false) => {}
                Err(err) => tracing::warn!(%tag, %err, "dropped expression write"),
            }
        }
        changed
    }

    /// Property map a props node would hand to its view now
    pub fn props_map(&self, tag: NodeTag) -> Result<PropMap, GraphError> {
        let NodeKind::Props(props) = &self.find_node(tag)?.kind else {
            return Err(GraphError::InvalidConfig(format!(
                "node {tag} is not a props node"
            )));
        };

        let mut map = PropMap::new();
        for (name, source) in &props.props {
            let Some(node) = self.nodes.get(source) else {
                continue;
            };
            match &node.kind {
                NodeKind::Style(style) => {
                    for (style_name, style_source) in style {
                        if let Some(value) = self.prop_value(*style_source) {
                            map.insert(style_name.clone(), value);
                        }
                    }
                }
                _ => {
                    if let Some(value) = self.prop_value(*source) {
                        map.insert(name.clone(), value);
                    }
                }
            }
        }
        Ok(map)
    }

    fn prop_value(&self, tag: NodeTag) -> Option<PropValue> {
        let node = self.nodes.get(&tag)?;
        match &node.kind {
            NodeKind::Transform(entries) => Some(PropValue::Transform(
                entries
                    .iter()
                    .map(|entry| TransformValue {
                        property: entry.property,
                        value: match entry.operand {
                            TransformOperand::Animated(source) => self.read(source),
                            TransformOperand::Static(value) => value,
                        },
                    })
                    .collect(),
            )),
            NodeKind::Style(_) | NodeKind::Props(_) => None,
            _ => Some(PropValue::Number(node.value())),
        }
    }

    /// Take the pending update of an attached props node.
    ///
    /// Returns `None` when the node is detached, unknown, or its property
    /// map equals the one last handed out.
    pub fn take_props_update(&mut self, tag: NodeTag) -> Option<(ViewId, PropMap)> {
        let map = self.props_map(tag).ok()?;
        let NodeKind::Props(props) = &mut self.nodes.get_mut(&tag)?.kind else {
            return None;
        };
        let view = props.view?;
        if props.last_sent.as_ref() == Some(&map) {
            return None;
        }
        props.last_sent = Some(map.clone());
        Some((view, map))
    }

    /// Reset every property of a props node to the view default.
    ///
    /// Returns the reset update when the node is attached to a view.
    pub fn restore_default_values(
        &mut self,
        tag: NodeTag,
    ) -> Result<Option<(ViewId, PropMap)>, GraphError> {
        let map = self.props_map(tag)?;
        let NodeKind::Props(props) = &mut self.find_node_mut(tag)?.kind else {
            return Err(GraphError::InvalidConfig(format!(
                "node {tag} is not a props node"
            )));
        };
        let mut reset: PropMap = map.into_keys().map(|k| (k, PropValue::Default)).collect();
        if let Some(last) = props.last_sent.take() {
            for key in last.into_keys() {
                reset.entry(key).or_insert(PropValue::Default);
            }
        }
        Ok(props.view.map(|view| (view, reset)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn create(graph: &mut NodeGraph, tag: u32, config: serde_json::Value) {
        graph.create_node_from_json(NodeTag(tag), &config).unwrap();
    }

    /// Three inputs summed into one props sink on view 10
    fn sum_scene() -> NodeGraph {
        let mut graph = NodeGraph::new();
        for tag in 1..=3 {
            create(&mut graph, tag, json!({"type": "value", "value": 0}));
        }
        create(&mut graph, 4, json!({"type": "addition", "input": [1, 2, 3]}));
        create(&mut graph, 5, json!({"type": "props", "props": {"height": 4}}));
        for tag in 1..=3 {
            graph.connect(NodeTag(4), NodeTag(tag)).unwrap();
        }
        graph.connect(NodeTag(5), NodeTag(4)).unwrap();
        graph.connect_to_view(NodeTag(5), ViewId(10)).unwrap();
        graph.propagate();
        graph.take_props_update(NodeTag(5));
        graph
    }

    #[test]
    fn test_batched_inputs_single_update() {
        let mut graph = sum_scene();
        graph.set_base_value(NodeTag(1), 1.0).unwrap();
        graph.set_base_value(NodeTag(2), 2.0).unwrap();
        graph.set_base_value(NodeTag(3), 4.0).unwrap();

        let outcome = graph.propagate();
        assert_eq!(outcome.touched_sinks.len(), 1);
        assert_eq!(outcome.recomputed.iter().filter(|t| **t == NodeTag(4)).count(), 1);

        let (view, map) = graph.take_props_update(NodeTag(5)).unwrap();
        assert_eq!(view, ViewId(10));
        assert_eq!(map.get("height"), Some(&PropValue::Number(7.0)));
        assert!(graph.take_props_update(NodeTag(5)).is_none());
    }

    #[test]
    fn test_unchanged_inputs_emit_nothing() {
        let mut graph = sum_scene();
        graph.mark_updated(NodeTag(1)).unwrap();
        let outcome = graph.propagate();
        assert!(outcome.touched_sinks.contains(&NodeTag(5)));
        assert!(graph.take_props_update(NodeTag(5)).is_none());
    }

    #[test]
    fn test_only_affected_subgraph_recomputed() {
        let mut graph = sum_scene();
        create(&mut graph, 6, json!({"type": "value", "value": 0}));
        create(&mut graph, 7, json!({"type": "multiplication", "input": [6]}));
        graph.connect(NodeTag(7), NodeTag(6)).unwrap();
        graph.propagate();

        graph.set_base_value(NodeTag(6), 3.0).unwrap();
        let outcome = graph.propagate();
        assert_eq!(outcome.recomputed, vec![NodeTag(6), NodeTag(7)]);
        assert!(outcome.touched_sinks.is_empty());
    }

    #[test]
    fn test_diamond_evaluates_after_inputs() {
        let mut graph = NodeGraph::new();
        create(&mut graph, 1, json!({"type": "value", "value": 1}));
        create(&mut graph, 2, json!({"type": "multiplication", "input": [1]}));
        create(&mut graph, 3, json!({"type": "addition", "input": [1, 2]}));
        graph.connect(NodeTag(2), NodeTag(1)).unwrap();
        graph.connect(NodeTag(3), NodeTag(1)).unwrap();
        graph.connect(NodeTag(3), NodeTag(2)).unwrap();

        graph.set_base_value(NodeTag(1), 5.0).unwrap();
        let outcome = graph.propagate();
        assert_eq!(outcome.recomputed, vec![NodeTag(1), NodeTag(2), NodeTag(3)]);
        assert_eq!(graph.value_of(NodeTag(3)), Some(10.0));
    }

    #[test]
    fn test_style_and_transform_flattening() {
        let mut graph = NodeGraph::new();
        create(&mut graph, 1, json!({"type": "value", "value": -20}));
        create(&mut graph, 2, json!({"type": "value", "value": 0.5}));
        create(
            &mut graph,
            3,
            json!({"type": "transform", "transforms": [
                {"type": "animated", "property": "translateY", "nodeTag": 1},
                {"type": "static", "property": "rotate", "value": "180deg"},
            ]}),
        );
        create(&mut graph, 4, json!({"type": "style", "style": {"opacity": 2, "transform": 3}}));
        create(&mut graph, 5, json!({"type": "props", "props": {"style": 4}}));
        graph.connect(NodeTag(3), NodeTag(1)).unwrap();
        graph.connect(NodeTag(4), NodeTag(2)).unwrap();
        graph.connect(NodeTag(4), NodeTag(3)).unwrap();
        graph.connect(NodeTag(5), NodeTag(4)).unwrap();
        graph.connect_to_view(NodeTag(5), ViewId(1)).unwrap();
        graph.propagate();

        let (_, map) = graph.take_props_update(NodeTag(5)).unwrap();
        assert_eq!(map.get("opacity"), Some(&PropValue::Number(0.5)));
        let transform = map.get("transform").and_then(PropValue::as_transform).unwrap();
        assert_eq!(transform[0].value, -20.0);
        assert!((transform[1].value - std::f64::consts::PI).abs() < 1e-12);
        assert!(map.get("style").is_none());
    }

    #[test]
    fn test_interpolation_and_diff_clamp_chain() {
        let mut graph = NodeGraph::new();
        create(&mut graph, 1, json!({"type": "value", "value": 0}));
        create(&mut graph, 2, json!({"type": "diffclamp", "min": 0, "max": 50}));
        create(
            &mut graph,
            3,
            json!({"type": "interpolation", "inputRange": [0, 50], "outputRange": [0, -50], "extrapolate": "clamp"}),
        );
        graph.connect(NodeTag(2), NodeTag(1)).unwrap();
        graph.connect(NodeTag(3), NodeTag(2)).unwrap();
        graph.propagate();

        for (scroll, header) in [(30.0, -30.0), (120.0, -50.0), (100.0, -30.0)] {
            graph.set_base_value(NodeTag(1), scroll).unwrap();
            graph.propagate();
            assert_eq!(graph.value_of(NodeTag(3)), Some(header));
        }
    }

    #[test]
    fn test_expression_writes_are_deferred() {
        let mut graph = NodeGraph::new();
        create(&mut graph, 1, json!({"type": "value", "value": 2}));
        create(&mut graph, 2, json!({"type": "value", "value": 0}));
        create(
            &mut graph,
            3,
            json!({"type": "expression", "graph": {
                "type": "set", "target": 2,
                "source": {"type": "multiply", "a": {"type": "value", "tag": 1}, "b": {"type": "number", "value": 10}},
            }}),
        );
        graph.connect(NodeTag(3), NodeTag(1)).unwrap();

        let outcome = graph.propagate();
        assert_eq!(graph.value_of(NodeTag(3)), Some(20.0));
        assert_eq!(graph.value_of(NodeTag(2)), Some(0.0));
        assert_eq!(outcome.writes, vec![(NodeTag(2), 20.0)]);

        assert_eq!(graph.apply_writes(&outcome.writes), 1);
        assert_eq!(graph.value_of(NodeTag(2)), Some(20.0));
        assert!(graph.has_pending_updates());
    }

    #[test]
    fn test_proc_binds_params() {
        let mut graph = NodeGraph::new();
        create(&mut graph, 1, json!({"type": "value", "value": 3}));
        create(&mut graph, 2, json!({"type": "value", "value": 0}));
        create(
            &mut graph,
            3,
            json!({"type": "expression", "graph": {
                "type": "pow", "a": {"type": "value", "tag": 2}, "b": {"type": "number", "value": 2},
            }}),
        );
        create(&mut graph, 4, json!({"type": "proc", "expression": 3, "args": [1], "params": [2]}));
        graph.connect(NodeTag(4), NodeTag(1)).unwrap();
        graph.mark_updated(NodeTag(1)).unwrap();
        graph.propagate();
        assert_eq!(graph.value_of(NodeTag(4)), Some(9.0));
        assert_eq!(graph.value_of(NodeTag(2)), Some(3.0));
    }

    #[test]
    fn test_tracking_requests_driver() {
        let mut graph = NodeGraph::new();
        create(&mut graph, 1, json!({"type": "value", "value": 0}));
        create(&mut graph, 2, json!({"type": "value", "value": 0}));
        create(
            &mut graph,
            3,
            json!({"type": "tracking", "animationId": 9, "toValue": 1, "value": 2,
                   "animationConfig": {"type": "spring", "stiffness": 100, "damping": 10, "mass": 1}}),
        );
        graph.connect(NodeTag(3), NodeTag(1)).unwrap();
        graph.set_base_value(NodeTag(1), 40.0).unwrap();
        let outcome = graph.propagate();
        assert_eq!(outcome.tracking.len(), 1);
        let request = &outcome.tracking[0];
        assert_eq!(request.animation_id, AnimationId(9));
        assert_eq!(request.target, NodeTag(2));
        assert_eq!(request.config["toValue"], json!(40.0));
        assert_eq!(request.config["type"], json!("spring"));
    }

    #[test]
    fn test_tracking_forgets_dropped_and_disconnected_inputs() {
        let mut graph = NodeGraph::new();
        create(&mut graph, 1, json!({"type": "value", "value": 0}));
        create(&mut graph, 2, json!({"type": "value", "value": 0}));
        create(
            &mut graph,
            3,
            json!({"type": "tracking", "animationId": 9, "toValue": 1, "value": 2,
                   "animationConfig": {"type": "timing", "duration": 100}}),
        );
        graph.connect(NodeTag(3), NodeTag(1)).unwrap();
        graph.set_base_value(NodeTag(1), 50.0).unwrap();
        assert_eq!(graph.propagate().tracking.len(), 1);

        graph.drop_node(NodeTag(1), &[]).unwrap();
        assert!(graph.node(NodeTag(3)).unwrap().input_refs().is_empty());
        assert!(graph.propagate().tracking.is_empty());

        create(&mut graph, 4, json!({"type": "value", "value": 7}));
        graph.connect(NodeTag(3), NodeTag(4)).unwrap();
        assert_eq!(graph.propagate().tracking[0].config["toValue"], json!(7.0));
        graph.disconnect(NodeTag(3), NodeTag(4)).unwrap();
        assert!(graph.propagate().tracking.is_empty());
    }

    #[test]
    fn test_restore_default_values() {
        let mut graph = sum_scene();
        graph.set_base_value(NodeTag(1), 5.0).unwrap();
        graph.propagate();
        graph.take_props_update(NodeTag(5)).unwrap();

        let (view, reset) = graph.restore_default_values(NodeTag(5)).unwrap().unwrap();
        assert_eq!(view, ViewId(10));
        assert_eq!(reset.get("height"), Some(&PropValue::Default));

        // values are sent again after a restore
        graph.mark_updated(NodeTag(5)).unwrap();
        graph.propagate();
        assert!(graph.take_props_update(NodeTag(5)).is_some());
        assert!(graph.restore_default_values(NodeTag(1)).is_err());
    }
}
