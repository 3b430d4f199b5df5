// SPDX-License-Identifier: MIT OR Apache-2.0
//! Value listeners.

use indexmap::IndexMap;
use kinetic_graph::{NodeGraph, NodeTag};
use std::fmt;

/// Receives the value of a node whenever it changes
pub trait ValueObserver: Send {
    /// Called with the node's new observed value
    fn on_value(&mut self, tag: NodeTag, value: f64);
}

impl<F> ValueObserver for F
where
    F: FnMut(NodeTag, f64) + Send,
{
    fn on_value(&mut self, tag: NodeTag, value: f64) {
        self(tag, value);
    }
}

struct Listener {
    observer: Box<dyn ValueObserver>,
    last: Option<f64>,
}

/// Observers keyed by the node they listen to
#[derive(Default)]
pub struct ObserverRegistry {
    listeners: IndexMap<NodeTag, Listener>,
}

impl ObserverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen to `tag`, replacing any earlier observer
    pub fn insert(&mut self, tag: NodeTag, observer: Box<dyn ValueObserver>) {
        self.listeners.insert(tag, Listener { observer, last: None });
    }

    /// Stop listening to `tag`
    pub fn remove(&mut self, tag: NodeTag) -> bool {
        self.listeners.shift_remove(&tag).is_some()
    }

    /// Whether `tag` has an observer
    pub fn contains(&self, tag: NodeTag) -> bool {
        self.listeners.contains_key(&tag)
    }

    /// Push new values of the recomputed nodes.
    ///
    /// An observer is only called when its node's value differs from the
    /// one it last received.
    pub fn notify(&mut self, graph: &NodeGraph, recomputed: &[NodeTag]) -> usize {
        if self.listeners.is_empty() {
            return 0;
        }
        let mut pushed = 0;
        for tag in recomputed {
            let Some(listener) = self.listeners.get_mut(tag) else {
                continue;
            };
            let Some(value) = graph.value_of(*tag) else {
                continue;
            };
            if listener.last != Some(value) {
                listener.last = Some(value);
                listener.observer.on_value(*tag, value);
                pushed += 1;
            }
        }
        pushed
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("listening", &self.listeners.keys().collect::<Vec<_>>())
            .finish()
    }
}
