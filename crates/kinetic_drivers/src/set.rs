// SPDX-License-Identifier: MIT OR Apache-2.0
//! The set of active drivers, stepped once per frame.

use crate::config::DriverConfig;
use crate::driver::{Completion, CompletionCallback, Driver};
use indexmap::map::Entry;
use indexmap::IndexMap;
use kinetic_graph::{AnimationId, NodeGraph, NodeTag};
use serde::{Deserialize, Serialize};

/// Which write survives when several drivers target one node in a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Arbitration {
    /// The driver stepped last wins
    #[default]
    LastWriteWins,
    /// The driver stepped first wins
    FirstWriteWins,
}

/// Error from a driver operation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DriverError {
    /// Malformed driver configuration
    #[error("Invalid driver config: {0}")]
    InvalidConfig(String),

    /// No driver with this id
    #[error("Unknown animation: {0}")]
    UnknownAnimation(AnimationId),
}

/// What one frame of stepping did
#[derive(Debug, Default)]
pub struct StepReport {
    /// Values written to the graph, one per target
    pub written: Vec<(NodeTag, f64)>,
    /// Drivers that reached a terminal state, callbacks not yet run
    pub completions: Vec<Completion>,
    /// Writes discarded by arbitration
    pub conflicts: usize,
}

/// Active drivers keyed by animation id, in start order
#[derive(Debug)]
pub struct DriverSet {
    drivers: IndexMap<AnimationId, Driver>,
    arbitration: Arbitration,
    warn_on_conflict: bool,
}

impl DriverSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self {
            drivers: IndexMap::new(),
            arbitration: Arbitration::default(),
            warn_on_conflict: true,
        }
    }

    /// Set the arbitration policy
    pub fn with_arbitration(mut self, arbitration: Arbitration) -> Self {
        self.arbitration = arbitration;
        self
    }

    /// Enable or disable conflict warnings
    pub fn with_conflict_warnings(mut self, enabled: bool) -> Self {
        self.warn_on_conflict = enabled;
        self
    }

    /// Start an animation on `target`.
    ///
    /// A driver already running under `id` is replaced; its completion,
    /// with `finished = false`, is returned.
    pub fn start(
        &mut self,
        id: AnimationId,
        target: NodeTag,
        config: &DriverConfig,
        callback: Option<CompletionCallback>,
    ) -> Result<Option<Completion>, DriverError> {
        let (animation, iterations) = config.build()?;
        let mut driver = Driver::new(id, target, animation, iterations);
        if let Some(callback) = callback {
            driver = driver.with_callback(callback);
        }

        let replaced = self.stop(id);
        tracing::debug!(animation = %id, %target, kind = config.kind(), "driver started");
        self.drivers.insert(id, driver);
        Ok(replaced)
    }

    /// Stop an animation; returns its completion if it existed
    pub fn stop(&mut self, id: AnimationId) -> Option<Completion> {
        let mut driver = self.drivers.shift_remove(&id)?;
        driver.stop();
        Some(driver.into_completion())
    }

    /// Stop every animation targeting `target`
    pub fn stop_targeting(&mut self, target: NodeTag) -> Vec<Completion> {
        let ids: Vec<AnimationId> = self
            .drivers
            .values()
            .filter(|d| d.target() == target)
            .map(Driver::id)
            .collect();
        ids.into_iter().filter_map(|id| self.stop(id)).collect()
    }

    /// Look up a driver
    pub fn get(&self, id: AnimationId) -> Option<&Driver> {
        self.drivers.get(&id)
    }

    /// Number of drivers
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Whether any driver is pending or running
    pub fn has_active(&self) -> bool {
        self.drivers.values().any(|d| d.state().is_active())
    }

    /// Step every active driver to `now_ms` and write the results.
    ///
    /// A driver whose target no longer exists, or no longer holds a value,
    /// is stopped without writing. Terminal drivers are removed and their
    /// completions returned.
    pub fn step(&mut self, now_ms: f64, graph: &mut NodeGraph) -> StepReport {
        let mut report = StepReport::default();
        let mut writes: IndexMap<NodeTag, (AnimationId, f64)> = IndexMap::new();

        for driver in self.drivers.values_mut() {
            if !driver.state().is_active() {
                continue;
            }
            let target = driver.target();
            let current = match graph.node(target) {
                Some(node) if node.holds_value() => node.base_value(),
                _ => {
                    tracing::debug!(animation = %driver.id(), %target, "target gone, stopping driver");
                    driver.stop();
                    continue;
                }
            };
            let Some(value) = driver.step(now_ms, current) else {
                continue;
            };

            match writes.entry(target) {
                Entry::Vacant(entry) => {
                    entry.insert((driver.id(), value));
                }
                Entry::Occupied(mut entry) => {
                    report.conflicts += 1;
                    let (kept, discarded) = match self.arbitration {
                        Arbitration::LastWriteWins => (driver.id(), entry.get().0),
                        Arbitration::FirstWriteWins => (entry.get().0, driver.id()),
                    };
                    if self.warn_on_conflict {
                        tracing::warn!(%target, %kept, %discarded, "several drivers wrote one node this frame");
                    }
                    if self.arbitration == Arbitration::LastWriteWins {
                        entry.insert((driver.id(), value));
                    }
                }
            }
        }

        for (target, (id, value)) in writes {
            match graph.set_base_value(target, value) {
                Ok(_) => report.written.push((target, value)),
                Err(err) => tracing::warn!(animation = %id, %err, "driver write rejected"),
            }
        }

        let ended: Vec<AnimationId> = self
            .drivers
            .values()
            .filter(|d| !d.state().is_active())
            .map(Driver::id)
            .collect();
        for id in ended {
            if let Some(driver) = self.drivers.shift_remove(&id) {
                report.completions.push(driver.into_completion());
            }
        }
        report
    }
}

impl Default for DriverSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::AnimationEnd;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    fn graph_with_value(tag: u32) -> NodeGraph {
        let mut graph = NodeGraph::new();
        graph
            .create_node_from_json(NodeTag(tag), &json!({"type": "value", "value": 0}))
            .unwrap();
        graph
    }

    fn timing(to_value: f64, duration: f64) -> DriverConfig {
        DriverConfig::from_json(&json!({
            "type": "timing", "toValue": to_value, "duration": duration, "easing": "linear",
        }))
        .unwrap()
    }

    fn recorder() -> (Arc<Mutex<Vec<AnimationEnd>>>, CompletionCallback) {
        let ends = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&ends);
        (ends, Box::new(move |end| sink.lock().push(end)))
    }

    fn deliver(report: StepReport) {
        for completion in report.completions {
            completion.deliver();
        }
    }

    #[test]
    fn test_timing_finishes_once() {
        let mut graph = graph_with_value(1);
        let mut set = DriverSet::new();
        let (ends, callback) = recorder();
        set.start(AnimationId(1), NodeTag(1), &timing(100.0, 1000.0), Some(callback))
            .unwrap();

        let mut now = 0.0;
        while now <= 1100.0 {
            deliver(set.step(now, &mut graph));
            now += 100.0;
        }

        assert!(set.is_empty());
        assert_eq!(graph.value_of(NodeTag(1)), Some(100.0));
        let ends = ends.lock();
        assert_eq!(ends.len(), 1);
        assert!(ends[0].finished);
        assert_eq!(ends[0].value, Some(100.0));
    }

    #[test]
    fn test_stop_reports_unfinished_and_stops_writes() {
        let mut graph = graph_with_value(1);
        let mut set = DriverSet::new();
        let (ends, callback) = recorder();
        set.start(AnimationId(1), NodeTag(1), &timing(100.0, 1000.0), Some(callback))
            .unwrap();
        set.step(0.0, &mut graph);
        set.step(500.0, &mut graph);
        assert_eq!(graph.value_of(NodeTag(1)), Some(50.0));

        set.stop(AnimationId(1)).unwrap().deliver();
        let report = set.step(600.0, &mut graph);
        assert!(report.written.is_empty());
        assert_eq!(graph.value_of(NodeTag(1)), Some(50.0));
        assert_eq!(*ends.lock(), vec![AnimationEnd {
            animation_id: AnimationId(1),
            finished: false,
            value: Some(50.0),
        }]);
        assert!(set.stop(AnimationId(1)).is_none());
    }

    #[test]
    fn test_dropped_target_stops_driver() {
        let mut graph = graph_with_value(1);
        let mut set = DriverSet::new();
        let (ends, callback) = recorder();
        set.start(AnimationId(1), NodeTag(1), &timing(100.0, 1000.0), Some(callback))
            .unwrap();
        set.step(0.0, &mut graph);
        graph.drop_node(NodeTag(1), &[]).unwrap();

        let report = set.step(16.0, &mut graph);
        assert!(report.written.is_empty());
        assert!(!graph.contains(NodeTag(1)));
        deliver(report);
        assert_eq!(ends.lock().len(), 1);
        assert!(!ends.lock()[0].finished);
        assert!(set.is_empty());
    }

    #[test]
    fn test_stop_targeting_only_hits_that_target() {
        let mut set = DriverSet::new();
        let (ends, callback) = recorder();
        set.start(AnimationId(1), NodeTag(1), &timing(1.0, 100.0), Some(callback))
            .unwrap();
        set.start(AnimationId(2), NodeTag(2), &timing(1.0, 100.0), None)
            .unwrap();

        for completion in set.stop_targeting(NodeTag(1)) {
            completion.deliver();
        }
        assert_eq!(set.len(), 1);
        assert!(set.get(AnimationId(2)).is_some());
        assert!(!ends.lock()[0].finished);
        assert!(set.stop_targeting(NodeTag(1)).is_empty());
    }

    #[test]
    fn test_restart_replaces_driver() {
        let mut set = DriverSet::new();
        let (ends, callback) = recorder();
        set.start(AnimationId(3), NodeTag(1), &timing(1.0, 100.0), Some(callback))
            .unwrap();
        let replaced = set
            .start(AnimationId(3), NodeTag(1), &timing(2.0, 100.0), None)
            .unwrap();
        replaced.unwrap().deliver();
        assert_eq!(set.len(), 1);
        assert!(!ends.lock()[0].finished);
    }

    #[test]
    fn test_arbitration_policies() {
        for (policy, expected) in [
            (Arbitration::LastWriteWins, 20.0),
            (Arbitration::FirstWriteWins, 10.0),
        ] {
            let mut graph = graph_with_value(1);
            let mut set = DriverSet::new()
                .with_arbitration(policy)
                .with_conflict_warnings(false);
            set.start(AnimationId(1), NodeTag(1), &timing(10.0, 0.0), None)
                .unwrap();
            set.start(AnimationId(2), NodeTag(1), &timing(20.0, 0.0), None)
                .unwrap();
            let report = set.step(0.0, &mut graph);
            assert_eq!(report.conflicts, 1);
            assert_eq!(graph.value_of(NodeTag(1)), Some(expected));
        }
    }

    #[test]
    fn test_invalid_config_rejected_at_start() {
        let mut set = DriverSet::new();
        let config = DriverConfig::from_json(&json!({"type": "decay", "velocity": 1, "deceleration": 2}))
            .unwrap();
        assert!(matches!(
            set.start(AnimationId(1), NodeTag(1), &config, None),
            Err(DriverError::InvalidConfig(_))
        ));
        assert!(set.is_empty());
    }
}
