// SPDX-License-Identifier: MIT OR Apache-2.0
//! The nodes manager: owner of the graph, drivers, bindings and frame loop.
//!
//! All state lives on one owning context. Operations called directly on the
//! manager apply immediately; operations from other threads arrive through
//! the [`AnimatedModule`] queue, which wakes an idle loop, and are applied at
//! the start of the next tick.
//!
//! Each tick, [`NodesManager::on_frame`]:
//! 1. applies queued commands,
//! 2. steps every active driver,
//! 3. settles propagation, including expression writes and tracking drivers,
//! 4. hands one [`FrameBatch`] to the view updater,
//! 5. delivers completion callbacks of drivers that ended,
//! 6. unsubscribes from the display link once nothing is left to do.

use crate::commands::{self, AnimatedModule, Command, CommandFailure};
use crate::config::EngineConfig;
use crate::error::AnimatedError;
use crate::events::{EventDispatch, EventMapping, EventRouter};
use crate::frame_loop::{DisplayLink, FrameLoop, LoopState};
use crate::observer::{ObserverRegistry, ValueObserver};
use crate::view::{FrameBatch, ViewUpdater};
use indexmap::IndexSet;
use kinetic_drivers::{Completion, CompletionCallback, DriverConfig, DriverSet};
use kinetic_graph::{
    AnimationId, GraphError, NodeGraph, NodeTag, PropMap, PropagationOutcome, TrackingRequest,
    ViewId,
};
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;

/// What one tick did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameReport {
    /// Tick counter
    pub frame: u64,
    /// Virtual time handed to drivers
    pub now_ms: f64,
    /// Queued commands that failed
    pub command_failures: usize,
    /// Values written by drivers
    pub driver_writes: usize,
    /// Props updates handed to the view updater
    pub view_updates: usize,
    /// Drivers that ended this tick
    pub completed: usize,
}

/// Owner of all animation state
pub struct NodesManager {
    config: EngineConfig,
    graph: NodeGraph,
    drivers: DriverSet,
    router: EventRouter,
    observers: ObserverRegistry,
    frame_loop: FrameLoop,
    view: Box<dyn ViewUpdater>,
    dirty_sinks: IndexSet<NodeTag>,
    resets: Vec<(ViewId, PropMap)>,
    module: AnimatedModule,
    commands: UnboundedReceiver<Command>,
}

impl NodesManager {
    /// Create a manager pushing updates to `view` and ticking on `link`
    pub fn new(
        config: EngineConfig,
        view: impl ViewUpdater + 'static,
        link: impl DisplayLink + 'static,
    ) -> Self {
        let drivers = DriverSet::new()
            .with_arbitration(config.driver_arbitration)
            .with_conflict_warnings(config.warn_on_driver_conflict);
        let router = EventRouter::new().with_name_normalization(config.normalize_event_names);
        let frame_loop = FrameLoop::new(
            Box::new(link),
            config.default_frame_interval_ms,
            config.max_frame_delta_ms,
        );
        let (module, commands) = commands::channel(frame_loop.waker());
        Self {
            config,
            graph: NodeGraph::new(),
            drivers,
            router,
            observers: ObserverRegistry::new(),
            frame_loop,
            view: Box::new(view),
            dirty_sinks: IndexSet::new(),
            resets: Vec::new(),
            module,
            commands,
        }
    }

    /// Handle for enqueueing commands from other threads
    pub fn module(&self) -> AnimatedModule {
        self.module.clone()
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The node graph
    pub fn graph(&self) -> &NodeGraph {
        &self.graph
    }

    /// The event router
    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Frame loop state
    pub fn loop_state(&self) -> LoopState {
        self.frame_loop.state()
    }

    /// Whether any driver is pending or running
    pub fn has_active_animations(&self) -> bool {
        self.drivers.has_active()
    }

    /// Observed value of a node
    pub fn value(&self, tag: NodeTag) -> Result<f64, AnimatedError> {
        Ok(self.graph.observed_value(tag)?)
    }

    // Graph

    /// `createNode`
    pub fn create_node(&mut self, tag: NodeTag, config: &Value) -> Result<(), AnimatedError> {
        self.graph.create_node_from_json(tag, config)?;
        Ok(())
    }

    /// `connect`
    pub fn connect(&mut self, parent: NodeTag, child: NodeTag) -> Result<(), AnimatedError> {
        self.graph.connect(parent, child)?;
        self.schedule();
        Ok(())
    }

    /// `disconnect`
    pub fn disconnect(&mut self, parent: NodeTag, child: NodeTag) -> Result<(), AnimatedError> {
        self.graph.disconnect(parent, child)?;
        self.schedule();
        Ok(())
    }

    /// `connectToView`
    pub fn connect_to_view(&mut self, tag: NodeTag, view: ViewId) -> Result<(), AnimatedError> {
        self.graph.connect_to_view(tag, view)?;
        self.schedule();
        Ok(())
    }

    /// `disconnectFromView`
    pub fn disconnect_from_view(&mut self, tag: NodeTag, view: ViewId) -> Result<(), AnimatedError> {
        self.graph.disconnect_from_view(tag, view)?;
        self.dirty_sinks.shift_remove(&tag);
        Ok(())
    }

    /// `dropNode`.
    ///
    /// Fails while an event binding still targets the node. Drivers
    /// targeting it are stopped at once and their callbacks receive
    /// `finished = false`.
    pub fn drop_node(&mut self, tag: NodeTag) -> Result<(), AnimatedError> {
        self.graph.drop_node(tag, &[&self.router])?;
        for completion in self.drivers.stop_targeting(tag) {
            tracing::debug!(animation = %completion.end().animation_id, %tag, "driver target dropped");
            completion.deliver();
        }
        self.observers.remove(tag);
        self.dirty_sinks.shift_remove(&tag);
        self.schedule();
        Ok(())
    }

    // Values

    /// `setValue`
    pub fn set_value(&mut self, tag: NodeTag, value: f64) -> Result<(), AnimatedError> {
        self.graph.set_base_value(tag, value)?;
        self.schedule();
        Ok(())
    }

    /// `setOffset`
    pub fn set_offset(&mut self, tag: NodeTag, offset: f64) -> Result<(), AnimatedError> {
        self.graph.set_offset(tag, offset)?;
        self.schedule();
        Ok(())
    }

    /// `flattenOffset`
    pub fn flatten_offset(&mut self, tag: NodeTag) -> Result<(), AnimatedError> {
        self.graph.flatten_offset(tag)?;
        self.schedule();
        Ok(())
    }

    /// `extractOffset`
    pub fn extract_offset(&mut self, tag: NodeTag) -> Result<(), AnimatedError> {
        self.graph.extract_offset(tag)?;
        self.schedule();
        Ok(())
    }

    /// `restoreDefaultValues`: queue a reset of the props node's view
    /// properties for the next flush
    pub fn restore_default_values(&mut self, tag: NodeTag) -> Result<(), AnimatedError> {
        if let Some(reset) = self.graph.restore_default_values(tag)? {
            self.dirty_sinks.shift_remove(&tag);
            self.resets.push(reset);
            self.schedule();
        }
        Ok(())
    }

    // Drivers

    /// `startAnimation`.
    ///
    /// The config is validated here; a driver already running under `id` is
    /// replaced and its callback receives `finished = false`.
    pub fn start_animation(
        &mut self,
        id: AnimationId,
        tag: NodeTag,
        config: &Value,
        callback: Option<CompletionCallback>,
    ) -> Result<(), AnimatedError> {
        let node = self.graph.find_node(tag)?;
        if !node.holds_value() {
            return Err(GraphError::InvalidConfig(format!(
                "{} node {tag} cannot be animated",
                node.kind.name()
            ))
            .into());
        }
        let config = DriverConfig::from_json(config)?;
        let replaced = self.drivers.start(id, tag, &config, callback)?;
        deliver(replaced);
        self.schedule();
        Ok(())
    }

    /// `stopAnimation`; takes effect immediately
    pub fn stop_animation(&mut self, id: AnimationId) -> Result<(), AnimatedError> {
        let completion = self
            .drivers
            .stop(id)
            .ok_or(kinetic_drivers::DriverError::UnknownAnimation(id))?;
        tracing::debug!(animation = %id, "driver stopped");
        completion.deliver();
        Ok(())
    }

    // Events

    /// `addEventBinding`; every target must be a live value node
    pub fn add_event_binding(
        &mut self,
        view: ViewId,
        event: &str,
        mappings: Vec<EventMapping>,
    ) -> Result<(), AnimatedError> {
        for mapping in &mappings {
            let node = self.graph.find_node(mapping.node_tag)?;
            if !node.holds_value() {
                return Err(GraphError::InvalidConfig(format!(
                    "event target {} is a {} node",
                    mapping.node_tag,
                    node.kind.name()
                ))
                .into());
            }
        }
        self.router.add_binding(view, event, mappings);
        Ok(())
    }

    /// `removeEventBinding`; removing a missing binding is a no-op
    pub fn remove_event_binding(&mut self, view: ViewId, event: &str, tag: NodeTag) -> usize {
        self.router.remove_binding(view, event, tag)
    }

    /// Dispatch a native event into its bound nodes and propagate
    pub fn handle_event(&mut self, view: ViewId, event: &str, payload: &Value) -> EventDispatch {
        let dispatch = self.router.handle_event(view, event, payload, &mut self.graph);
        if !dispatch.written.is_empty() {
            self.settle();
            self.schedule();
        }
        dispatch
    }

    // Listeners

    /// `startListening`
    pub fn start_listening(
        &mut self,
        tag: NodeTag,
        observer: Box<dyn ValueObserver>,
    ) -> Result<(), AnimatedError> {
        self.graph.find_node(tag)?;
        self.observers.insert(tag, observer);
        Ok(())
    }

    /// `stopListening`
    pub fn stop_listening(&mut self, tag: NodeTag) -> bool {
        self.observers.remove(tag)
    }

    // Frame loop

    /// Apply queued commands.
    ///
    /// At most `max_commands_per_frame` commands are applied; the rest stay
    /// queued for the next call. Failures are logged and returned.
    pub fn drain_commands(&mut self) -> Vec<CommandFailure> {
        let limit = self.config.max_commands_per_frame.unwrap_or(usize::MAX);
        let mut failures = Vec::new();
        let mut applied = 0;
        while applied < limit {
            let Ok(command) = self.commands.try_recv() else {
                break;
            };
            applied += 1;
            let name = command.description();
            if let Err(error) = command.execute(self) {
                tracing::warn!(command = name, %error, "queued command failed");
                failures.push(CommandFailure {
                    command: name,
                    error,
                });
            }
        }
        if applied > 0 {
            tracing::trace!(applied, failed = failures.len(), "drained commands");
        }
        failures
    }

    /// Run propagation until no more nodes are marked, or until
    /// `max_settle_passes` passes ran.
    ///
    /// Expression writes are applied between passes and tracking nodes
    /// (re)start their drivers. Touched props nodes are remembered for the
    /// next flush.
    pub fn settle(&mut self) -> PropagationOutcome {
        let mut total = PropagationOutcome::default();
        for _ in 0..self.config.max_settle_passes {
            if !self.graph.has_pending_updates() {
                break;
            }
            let outcome = self.graph.propagate();
            self.observers.notify(&self.graph, &outcome.recomputed);
            self.dirty_sinks.extend(outcome.touched_sinks.iter().copied());
            for request in &outcome.tracking {
                self.start_tracking(request);
            }
            self.graph.apply_writes(&outcome.writes);
            total.merge(outcome);
        }
        if self.graph.has_pending_updates() {
            tracing::warn!(
                passes = self.config.max_settle_passes,
                "propagation did not settle; remaining updates wait for the next tick"
            );
        }
        total
    }

    fn start_tracking(&mut self, request: &TrackingRequest) {
        let started = DriverConfig::from_json(&request.config)
            .and_then(|config| self.drivers.start(request.animation_id, request.target, &config, None));
        match started {
            Ok(replaced) => deliver(replaced),
            Err(err) => tracing::warn!(animation = %request.animation_id, %err, "tracking driver rejected"),
        }
    }

    /// Process one display refresh at host time `time_ms`
    pub fn on_frame(&mut self, time_ms: f64) -> FrameReport {
        let failures = self.drain_commands();
        let timing = self.frame_loop.tick(time_ms);

        let step = self.drivers.step(timing.now_ms, &mut self.graph);
        self.settle();
        let view_updates = self.flush(timing.frame);

        let completed = step.completions.len();
        for completion in step.completions {
            tracing::debug!(animation = %completion.end().animation_id, finished = completion.end().finished, "driver ended");
            completion.deliver();
        }

        if !self.has_work() {
            self.frame_loop.stop();
            // A send between the drain and the stop found the loop running
            if !self.commands.is_empty() {
                self.frame_loop.start();
            }
        }

        FrameReport {
            frame: timing.frame,
            now_ms: timing.now_ms,
            command_failures: failures.len(),
            driver_writes: step.written.len(),
            view_updates,
            completed,
        }
    }

    fn flush(&mut self, frame: u64) -> usize {
        let mut batch = FrameBatch {
            frame,
            updates: std::mem::take(&mut self.resets),
        };
        for tag in std::mem::take(&mut self.dirty_sinks) {
            if let Some(update) = self.graph.take_props_update(tag) {
                batch.updates.push(update);
            }
        }
        let count = batch.updates.len();
        if !batch.is_empty() {
            tracing::trace!(frame, updates = count, "flushing view updates");
            self.view.apply(batch);
        }
        count
    }

    fn has_work(&self) -> bool {
        self.drivers.has_active()
            || self.graph.has_pending_updates()
            || !self.dirty_sinks.is_empty()
            || !self.resets.is_empty()
    }

    /// Subscribe to refresh ticks when there is something to do
    fn schedule(&mut self) {
        if self.has_work() {
            self.frame_loop.start();
        }
    }
}

fn deliver(completion: Option<Completion>) {
    if let Some(completion) = completion {
        completion.deliver();
    }
}

impl std::fmt::Debug for NodesManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodesManager")
            .field("nodes", &self.graph.node_count())
            .field("drivers", &self.drivers.len())
            .field("bindings", &self.router.len())
            .field("frame_loop", &self.frame_loop)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_loop::ManualDisplayLink;
    use crate::view::RecordingViewUpdater;
    use kinetic_drivers::AnimationEnd;
    use kinetic_graph::PropValue;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;

    const FRAME: f64 = 1000.0 / 60.0;

    struct Harness {
        manager: NodesManager,
        view: RecordingViewUpdater,
        link: ManualDisplayLink,
        now: f64,
    }

    impl Harness {
        fn new() -> Self {
            let view = RecordingViewUpdater::new();
            let link = ManualDisplayLink::new();
            let manager = NodesManager::new(EngineConfig::default(), view.clone(), link.clone());
            Self {
                manager,
                view,
                link,
                now: 0.0,
            }
        }

        fn node(&mut self, tag: u32, config: Value) {
            self.manager.create_node(NodeTag(tag), &config).unwrap();
        }

        fn connect(&mut self, parent: u32, child: u32) {
            self.manager.connect(NodeTag(parent), NodeTag(child)).unwrap();
        }

        fn frame(&mut self) -> FrameReport {
            self.now += FRAME;
            self.manager.on_frame(self.now)
        }

        /// Tick while the display link asks for frames
        fn run(&mut self, max_frames: usize) -> usize {
            let mut frames = 0;
            while self.link.is_running() && frames < max_frames {
                self.frame();
                frames += 1;
            }
            frames
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<AnimationEnd>>>, CompletionCallback) {
        let ends = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&ends);
        (ends, Box::new(move |end| sink.lock().push(end)))
    }

    fn value_on_view(h: &mut Harness, value: u32, props: u32, view: u32, prop: &str) {
        h.node(value, json!({"type": "value", "value": 0}));
        let mut entries = serde_json::Map::new();
        entries.insert(prop.to_string(), json!(value));
        h.node(props, json!({"type": "props", "props": entries}));
        h.connect(props, value);
        h.manager.connect_to_view(NodeTag(props), ViewId(view)).unwrap();
    }

    fn timing(to_value: f64, duration: f64) -> Value {
        json!({"type": "timing", "toValue": to_value, "duration": duration, "easing": "linear"})
    }

    #[test]
    fn test_cycle_is_rejected_and_graph_unchanged() {
        let mut h = Harness::new();
        h.node(1, json!({"type": "addition"}));
        h.node(2, json!({"type": "addition"}));
        h.connect(1, 2);

        let err = h.manager.connect(NodeTag(2), NodeTag(1)).unwrap_err();
        assert_eq!(
            err,
            AnimatedError::Graph(GraphError::Cycle {
                parent: NodeTag(2),
                child: NodeTag(1)
            })
        );
        assert_eq!(h.manager.graph().edge_count(), 1);
        assert!(h.manager.graph().children_of(NodeTag(2)).is_empty());
    }

    #[test]
    fn test_unchanged_inputs_emit_no_update() {
        let mut h = Harness::new();
        value_on_view(&mut h, 1, 2, 5, "opacity");
        h.manager.set_value(NodeTag(1), 0.5).unwrap();
        h.run(10);
        assert_eq!(h.view.len(), 1);

        h.manager.set_value(NodeTag(1), 0.5).unwrap();
        h.frame();
        h.manager.flatten_offset(NodeTag(1)).unwrap();
        h.frame();
        assert_eq!(h.view.len(), 1);
    }

    #[test]
    fn test_offset_semantics() {
        let mut h = Harness::new();
        h.node(1, json!({"type": "value", "value": 0}));
        let tag = NodeTag(1);
        h.manager.set_value(tag, 10.0).unwrap();
        h.manager.set_offset(tag, 5.0).unwrap();
        assert_eq!(h.manager.value(tag).unwrap(), 15.0);

        h.manager.flatten_offset(tag).unwrap();
        let node = h.manager.graph().find_node(tag).unwrap();
        assert_eq!((node.base_value(), node.offset()), (15.0, 0.0));

        h.manager.set_offset(tag, 5.0).unwrap();
        h.manager.set_value(tag, 20.0).unwrap();
        assert_eq!(h.manager.value(tag).unwrap(), 25.0);
        h.manager.extract_offset(tag).unwrap();
        let node = h.manager.graph().find_node(tag).unwrap();
        assert_eq!((node.base_value(), node.offset()), (0.0, 25.0));
        assert_eq!(h.manager.value(tag).unwrap(), 25.0);
    }

    #[test]
    fn test_timing_driver_finishes_once() {
        let mut h = Harness::new();
        h.node(1, json!({"type": "value", "value": 0}));
        let (ends, callback) = recorder();
        h.manager
            .start_animation(AnimationId(1), NodeTag(1), &timing(100.0, 1000.0), Some(callback))
            .unwrap();
        assert!(h.link.is_running());
        assert!(h.manager.has_active_animations());

        let frames = h.run(200);
        assert!((60..200).contains(&frames), "ran {frames} frames");
        assert!(!h.link.is_running());
        assert!(!h.manager.has_active_animations());
        assert_eq!(h.manager.value(NodeTag(1)).unwrap(), 100.0);
        assert_eq!(*ends.lock(), vec![AnimationEnd {
            animation_id: AnimationId(1),
            finished: true,
            value: Some(100.0),
        }]);
    }

    #[test]
    fn test_stop_animation_reports_unfinished() {
        let mut h = Harness::new();
        h.node(1, json!({"type": "value", "value": 0}));
        let (ends, callback) = recorder();
        h.manager
            .start_animation(AnimationId(1), NodeTag(1), &timing(100.0, 1000.0), Some(callback))
            .unwrap();
        for _ in 0..10 {
            h.frame();
        }
        h.manager.stop_animation(AnimationId(1)).unwrap();
        let stopped_at = h.manager.value(NodeTag(1)).unwrap();
        assert!(stopped_at > 0.0 && stopped_at < 100.0);

        let report = h.frame();
        assert_eq!(report.driver_writes, 0);
        assert_eq!(h.manager.value(NodeTag(1)).unwrap(), stopped_at);
        assert_eq!(ends.lock().len(), 1);
        assert!(!ends.lock()[0].finished);
        assert!(matches!(
            h.manager.stop_animation(AnimationId(1)),
            Err(AnimatedError::Driver(_))
        ));
    }

    #[test]
    fn test_dropping_driver_target_stops_driver() {
        let mut h = Harness::new();
        h.node(1, json!({"type": "value", "value": 0}));
        let (ends, callback) = recorder();
        h.manager
            .start_animation(AnimationId(1), NodeTag(1), &timing(100.0, 1000.0), Some(callback))
            .unwrap();
        h.frame();
        h.frame();
        h.manager.drop_node(NodeTag(1)).unwrap();
        assert!(!h.manager.has_active_animations());
        assert_eq!(ends.lock().len(), 1);
        assert!(!ends.lock()[0].finished);

        let report = h.frame();
        assert_eq!(report.driver_writes, 0);
        assert_eq!(report.completed, 0);
        assert!(!h.manager.graph().contains(NodeTag(1)));
        assert!(!h.link.is_running());
    }

    #[test]
    fn test_reused_tag_is_not_written_by_old_driver() {
        let mut h = Harness::new();
        h.node(1, json!({"type": "value", "value": 0}));
        h.manager
            .start_animation(AnimationId(1), NodeTag(1), &timing(100.0, 1000.0), None)
            .unwrap();
        h.frame();
        h.frame();
        h.manager.drop_node(NodeTag(1)).unwrap();
        h.node(1, json!({"type": "value", "value": -5}));

        let report = h.frame();
        assert_eq!(report.driver_writes, 0);
        assert!(!h.manager.has_active_animations());
        assert_eq!(h.manager.value(NodeTag(1)).unwrap(), -5.0);
    }

    #[test]
    fn test_dropped_tracking_input_stops_following() {
        let mut h = Harness::new();
        h.node(1, json!({"type": "value", "value": 0}));
        h.node(2, json!({"type": "value", "value": 0}));
        h.node(
            3,
            json!({"type": "tracking", "animationId": 9, "toValue": 1, "value": 2,
                   "animationConfig": {"type": "timing", "duration": 100, "easing": "linear"}}),
        );
        h.connect(3, 1);
        h.manager.set_value(NodeTag(1), 50.0).unwrap();
        h.run(100);
        assert_eq!(h.manager.value(NodeTag(2)).unwrap(), 50.0);

        h.manager.drop_node(NodeTag(1)).unwrap();
        h.run(100);
        assert_eq!(h.manager.value(NodeTag(2)).unwrap(), 50.0);
        let tracking = h.manager.graph().find_node(NodeTag(3)).unwrap();
        assert!(tracking.input_refs().is_empty());
    }

    #[test]
    fn test_scroll_event_reaches_view() {
        let mut h = Harness::new();
        value_on_view(&mut h, 3, 4, 7, "translateY");
        h.run(10);
        h.view.take();

        h.manager
            .add_event_binding(
                ViewId(7),
                "onScroll",
                vec![EventMapping::new("contentOffset.y", NodeTag(3)).unwrap()],
            )
            .unwrap();
        let dispatch = h
            .manager
            .handle_event(ViewId(7), "onScroll", &json!({"contentOffset": {"y": 42}}));
        assert_eq!(dispatch.written, vec![(NodeTag(3), 42.0)]);
        assert_eq!(h.manager.value(NodeTag(3)).unwrap(), 42.0);
        assert!(h.link.is_running());

        h.frame();
        let batches = h.view.take();
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0].updates,
            vec![(ViewId(7), PropMap::from([("translateY".to_string(), PropValue::Number(42.0))]))]
        );

        assert!(matches!(
            h.manager.drop_node(NodeTag(3)),
            Err(AnimatedError::Graph(GraphError::NodeInUse { .. }))
        ));
        h.manager.remove_event_binding(ViewId(7), "topScroll", NodeTag(3));
        h.manager.disconnect(NodeTag(4), NodeTag(3)).unwrap();
        h.manager.drop_node(NodeTag(3)).unwrap();
    }

    #[test]
    fn test_event_binding_requires_value_target() {
        let mut h = Harness::new();
        value_on_view(&mut h, 1, 2, 1, "opacity");
        let binding = |tag| vec![EventMapping::new("y", NodeTag(tag)).unwrap()];
        assert!(matches!(
            h.manager.add_event_binding(ViewId(1), "onScroll", binding(2)),
            Err(AnimatedError::Graph(GraphError::InvalidConfig(_)))
        ));
        assert!(matches!(
            h.manager.add_event_binding(ViewId(1), "onScroll", binding(99)),
            Err(AnimatedError::Graph(GraphError::UnknownNode(_)))
        ));
        assert!(h.manager.router().is_empty());
    }

    #[test]
    fn test_updates_in_one_frame_are_batched() {
        let mut h = Harness::new();
        for tag in 1..=3 {
            h.node(tag, json!({"type": "value", "value": 0}));
        }
        h.node(4, json!({"type": "addition", "input": [1, 2, 3]}));
        h.node(5, json!({"type": "props", "props": {"sum": 4}}));
        for tag in 1..=3 {
            h.connect(4, tag);
        }
        h.connect(5, 4);
        h.manager.connect_to_view(NodeTag(5), ViewId(9)).unwrap();
        h.run(10);
        h.view.take();

        h.manager.set_value(NodeTag(1), 1.0).unwrap();
        h.manager.set_value(NodeTag(2), 2.0).unwrap();
        h.manager.set_value(NodeTag(3), 4.0).unwrap();
        h.run(10);

        let batches = h.view.take();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].updates.len(), 1);
        let (view, props) = &batches[0].updates[0];
        assert_eq!(*view, ViewId(9));
        assert_eq!(props.get("sum"), Some(&PropValue::Number(7.0)));
    }

    #[test]
    fn test_loop_idles_and_restarts() {
        let mut h = Harness::new();
        h.node(1, json!({"type": "value", "value": 0}));
        assert_eq!(h.manager.loop_state(), LoopState::Idle);

        h.manager
            .start_animation(AnimationId(1), NodeTag(1), &timing(1.0, 50.0), None)
            .unwrap();
        h.run(100);
        assert_eq!(h.manager.loop_state(), LoopState::Idle);
        assert_eq!((h.link.starts(), h.link.stops()), (1, 1));

        h.manager
            .start_animation(AnimationId(2), NodeTag(1), &timing(2.0, 50.0), None)
            .unwrap();
        assert_eq!(h.manager.loop_state(), LoopState::Running);
        h.run(100);
        assert_eq!(h.manager.value(NodeTag(1)).unwrap(), 2.0);
        assert_eq!(h.link.starts(), 2);
    }

    #[test]
    fn test_invalid_driver_config_rejected_at_start() {
        let mut h = Harness::new();
        h.node(1, json!({"type": "value", "value": 0}));
        h.node(2, json!({"type": "props", "props": {}}));
        assert!(matches!(
            h.manager.start_animation(AnimationId(1), NodeTag(1), &json!({"type": "timing"}), None),
            Err(AnimatedError::Driver(_))
        ));
        assert!(matches!(
            h.manager.start_animation(AnimationId(1), NodeTag(2), &timing(1.0, 10.0), None),
            Err(AnimatedError::Graph(GraphError::InvalidConfig(_)))
        ));
        assert!(matches!(
            h.manager.start_animation(AnimationId(1), NodeTag(3), &timing(1.0, 10.0), None),
            Err(AnimatedError::Graph(GraphError::UnknownNode(_)))
        ));
        assert!(!h.link.is_running());
    }

    #[test]
    fn test_queued_commands_apply_on_tick() {
        let mut h = Harness::new();
        let module = h.manager.module();
        let worker = std::thread::spawn(move || {
            module.create_node(NodeTag(1), json!({"type": "value", "value": 0})).unwrap();
            module.create_node(NodeTag(2), json!({"type": "props", "props": {"opacity": 1}})).unwrap();
            module.connect(NodeTag(2), NodeTag(1)).unwrap();
            module.connect(NodeTag(2), NodeTag(42)).unwrap();
            module.connect_to_view(NodeTag(2), ViewId(3)).unwrap();
            module.set_value(NodeTag(1), 0.25).unwrap();
        });
        worker.join().unwrap();
        assert!(!h.manager.graph().contains(NodeTag(1)));
        assert!(h.link.is_running());

        let report = h.frame();
        assert_eq!(report.command_failures, 1);
        assert_eq!(report.view_updates, 1);
        let batches = h.view.take();
        assert_eq!(
            batches[0].for_view(ViewId(3)).next().and_then(|p| p.get("opacity")),
            Some(&PropValue::Number(0.25))
        );
    }

    #[test]
    fn test_enqueue_wakes_idle_loop() {
        let mut h = Harness::new();
        h.node(1, json!({"type": "value", "value": 0}));
        assert!(!h.link.is_running());

        let module = h.manager.module();
        let worker = std::thread::spawn(move || {
            module.create_node(NodeTag(2), json!({"type": "value", "value": 0})).unwrap();
            module
                .start_animation(AnimationId(1), NodeTag(2), timing(10.0, 100.0), None)
                .unwrap();
        });
        worker.join().unwrap();
        assert!(h.link.is_running());

        h.run(100);
        assert_eq!(h.manager.value(NodeTag(2)).unwrap(), 10.0);
        assert!(!h.link.is_running());

        h.manager.module().set_value(NodeTag(1), 0.0).unwrap();
        assert!(h.link.is_running());
        assert_eq!(h.run(10), 1);
    }

    #[test]
    fn test_drain_respects_command_budget() {
        let view = RecordingViewUpdater::new();
        let config = EngineConfig {
            max_commands_per_frame: Some(2),
            ..EngineConfig::default()
        };
        let mut manager = NodesManager::new(config, view, ManualDisplayLink::new());
        let module = manager.module();
        for tag in 0..5 {
            module.create_node(NodeTag(tag), json!({"type": "value"})).unwrap();
        }
        manager.drain_commands();
        assert_eq!(manager.graph().node_count(), 2);
        manager.drain_commands();
        manager.drain_commands();
        assert_eq!(manager.graph().node_count(), 5);
    }

    #[test]
    fn test_listener_receives_changes() {
        let mut h = Harness::new();
        h.node(1, json!({"type": "value", "value": 0}));
        h.node(2, json!({"type": "multiplication", "input": [1, 1]}));
        h.connect(2, 1);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        h.manager
            .start_listening(
                NodeTag(2),
                Box::new(move |_: NodeTag, value: f64| sink.lock().push(value)),
            )
            .unwrap();

        h.manager.set_value(NodeTag(1), 3.0).unwrap();
        h.frame();
        h.manager.set_value(NodeTag(1), 4.0).unwrap();
        h.frame();
        assert!(h.manager.stop_listening(NodeTag(2)));
        h.manager.set_value(NodeTag(1), 5.0).unwrap();
        h.frame();
        assert_eq!(*seen.lock(), vec![9.0, 16.0]);
    }

    #[test]
    fn test_restore_default_values() {
        let mut h = Harness::new();
        value_on_view(&mut h, 1, 2, 4, "opacity");
        h.manager.set_value(NodeTag(1), 0.5).unwrap();
        h.run(10);
        h.view.take();

        h.manager.restore_default_values(NodeTag(2)).unwrap();
        h.frame();
        let batches = h.view.take();
        assert_eq!(
            batches[0].updates,
            vec![(ViewId(4), PropMap::from([("opacity".to_string(), PropValue::Default)]))]
        );
    }

    #[test]
    fn test_tracking_node_drives_follower() {
        let mut h = Harness::new();
        h.node(1, json!({"type": "value", "value": 0}));
        h.node(2, json!({"type": "value", "value": 0}));
        h.node(
            3,
            json!({"type": "tracking", "animationId": 7, "toValue": 1, "value": 2,
                   "animationConfig": {"type": "timing", "duration": 100, "easing": "linear"}}),
        );
        h.connect(3, 1);
        h.manager.set_value(NodeTag(1), 50.0).unwrap();
        h.run(100);
        assert_eq!(h.manager.value(NodeTag(2)).unwrap(), 50.0);
        assert!(!h.link.is_running());
    }

    #[test]
    fn test_spring_settles_on_target() {
        let mut h = Harness::new();
        h.node(1, json!({"type": "value", "value": 0}));
        let (ends, callback) = recorder();
        h.manager
            .start_animation(
                AnimationId(1),
                NodeTag(1),
                &json!({"type": "spring", "toValue": 1, "stiffness": 100, "damping": 10, "mass": 1}),
                Some(callback),
            )
            .unwrap();
        h.run(1000);
        assert!(!h.link.is_running());
        assert_eq!(h.manager.value(NodeTag(1)).unwrap(), 1.0);
        assert!(ends.lock()[0].finished);
    }
}
