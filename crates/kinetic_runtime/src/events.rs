// SPDX-License-Identifier: MIT OR Apache-2.0
//! Native event routing into graph inputs.
//!
//! Bindings are keyed by view and event name. Each binding pairs a dot path
//! into the event payload (`contentOffset.y`, `touches.0.pageX`) with the
//! value node that receives the number found there.

use indexmap::IndexMap;
use kinetic_graph::{NodeGraph, NodeTag, TagHolder, ViewId};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Dot path into an event payload
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EventPath(Vec<String>);

impl EventPath {
    /// Parse `a.b.0.c`
    pub fn parse(path: &str) -> Result<Self, String> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(format!("invalid event path {path:?}"));
        }
        Ok(Self(segments))
    }

    /// Path segments
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number found at this path in `payload`
    pub fn extract(&self, payload: &Value) -> Result<f64, String> {
        let mut current = payload;
        for (depth, segment) in self.0.iter().enumerate() {
            let next = match current {
                Value::Object(map) => map.get(segment),
                Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
                _ => None,
            };
            current = next.ok_or_else(|| {
                format!("no field {:?}", self.0[..=depth].join("."))
            })?;
        }
        current
            .as_f64()
            .ok_or_else(|| format!("{self} is not a number"))
    }
}

impl TryFrom<String> for EventPath {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EventPath> for String {
    fn from(path: EventPath) -> Self {
        path.0.join(".")
    }
}

impl fmt::Display for EventPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("."))
    }
}

/// One payload field feeding one value node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventMapping {
    /// Where the number lives in the payload
    pub path: EventPath,
    /// Value node receiving it
    pub node_tag: NodeTag,
}

impl EventMapping {
    /// Create a mapping from a dot path
    pub fn new(path: &str, node_tag: NodeTag) -> Result<Self, String> {
        Ok(Self {
            path: EventPath::parse(path)?,
            node_tag,
        })
    }
}

/// Payload did not have the shape a binding expects
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Event {event} on {view}: binding to node {target} at {path}: {reason}")]
pub struct PayloadShapeError {
    /// View the event came from
    pub view: ViewId,
    /// Event name after normalization
    pub event: String,
    /// Offending path
    pub path: EventPath,
    /// Node the binding writes
    pub target: NodeTag,
    /// What was wrong
    pub reason: String,
}

/// Outcome of dispatching one event
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventDispatch {
    /// Values written, in binding order
    pub written: Vec<(NodeTag, f64)>,
    /// Bindings skipped because of the payload shape
    pub errors: Vec<PayloadShapeError>,
}

impl EventDispatch {
    /// Whether no binding matched
    pub fn is_empty(&self) -> bool {
        self.written.is_empty() && self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct EventKey {
    view: ViewId,
    event: String,
}

/// Event bindings by view and event name
#[derive(Debug, Default)]
pub struct EventRouter {
    bindings: IndexMap<EventKey, Vec<EventMapping>>,
    normalize_names: bool,
}

impl EventRouter {
    /// Create an empty router
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat `onX` and `topX` as the same event
    pub fn with_name_normalization(mut self, enabled: bool) -> Self {
        self.normalize_names = enabled;
        self
    }

    fn key(&self, view: ViewId, event: &str) -> EventKey {
        EventKey {
            view,
            event: if self.normalize_names {
                normalize_event_name(event)
            } else {
                event.to_string()
            },
        }
    }

    /// Add bindings for an event; earlier bindings for the same key stay.
    ///
    /// Returns how many new bindings were added; exact duplicates are
    /// skipped.
    pub fn add_binding(
        &mut self,
        view: ViewId,
        event: &str,
        mappings: impl IntoIterator<Item = EventMapping>,
    ) -> usize {
        let key = self.key(view, event);
        let entry = self.bindings.entry(key).or_default();
        let mut added = 0;
        for mapping in mappings {
            if !entry.contains(&mapping) {
                tracing::debug!(%view, event, path = %mapping.path, node = %mapping.node_tag, "event binding added");
                entry.push(mapping);
                added += 1;
            }
        }
        added
    }

    /// Remove the bindings of an event that target `tag`.
    ///
    /// Removing bindings that do not exist is not an error.
    pub fn remove_binding(&mut self, view: ViewId, event: &str, tag: NodeTag) -> usize {
        let key = self.key(view, event);
        let Some(entry) = self.bindings.get_mut(&key) else {
            return 0;
        };
        let before = entry.len();
        entry.retain(|m| m.node_tag != tag);
        let removed = before - entry.len();
        if entry.is_empty() {
            self.bindings.shift_remove(&key);
        }
        removed
    }

    /// Bindings registered for an event
    pub fn bindings(&self, view: ViewId, event: &str) -> &[EventMapping] {
        self.bindings
            .get(&self.key(view, event))
            .map_or(&[][..], Vec::as_slice)
    }

    /// Total number of bindings
    pub fn len(&self) -> usize {
        self.bindings.values().map(Vec::len).sum()
    }

    /// Whether there are no bindings
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Write every bound payload field into its node.
    ///
    /// A binding whose field is missing or not a number is logged and
    /// skipped; the others still fire. Written nodes are marked for the
    /// next propagation.
    pub fn handle_event(
        &self,
        view: ViewId,
        event: &str,
        payload: &Value,
        graph: &mut NodeGraph,
    ) -> EventDispatch {
        let key = self.key(view, event);
        let mut dispatch = EventDispatch::default();
        let Some(mappings) = self.bindings.get(&key) else {
            return dispatch;
        };

        for mapping in mappings {
            let value = match mapping.path.extract(payload) {
                Ok(value) => value,
                Err(reason) => {
                    let err = PayloadShapeError {
                        view,
                        event: key.event.clone(),
                        path: mapping.path.clone(),
                        target: mapping.node_tag,
                        reason,
                    };
                    tracing::warn!(%err, "skipping event binding");
                    dispatch.errors.push(err);
                    continue;
                }
            };
            match graph.set_base_value(mapping.node_tag, value) {
                Ok(_) => dispatch.written.push((mapping.node_tag, value)),
                Err(err) => tracing::warn!(node = %mapping.node_tag, %err, "event write rejected"),
            }
        }
        dispatch
    }
}

impl TagHolder for EventRouter {
    fn holds(&self, tag: NodeTag) -> bool {
        self.bindings
            .values()
            .flatten()
            .any(|m| m.node_tag == tag)
    }

    fn name(&self) -> &str {
        "an event binding"
    }
}

/// Map `onScroll` to `topScroll`; other names are unchanged
pub fn normalize_event_name(event: &str) -> String {
    match event.strip_prefix("on") {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_uppercase()) => format!("top{rest}"),
        _ => event.to_string(),
    }
}
