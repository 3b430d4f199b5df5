// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node graph store: the arena of live nodes and their adjacency.

use crate::connection::{Adjacency, Connection};
use crate::node::{Node, NodeConfig, NodeKind, NodeTag, ViewId};
use indexmap::{IndexMap, IndexSet};

/// Something outside the graph that refers to nodes by tag
pub trait TagHolder {
    /// Whether `tag` is still referenced
    fn holds(&self, tag: NodeTag) -> bool;

    /// Name used in error messages
    fn name(&self) -> &str;
}

/// The animated node graph
#[derive(Debug, Clone, Default)]
pub struct NodeGraph {
    /// All live nodes
    pub(crate) nodes: IndexMap<NodeTag, Node>,
    /// Edges between nodes
    pub(crate) edges: Adjacency,
    /// Nodes mutated since the last propagation
    pub(crate) updated: IndexSet<NodeTag>,
}

impl NodeGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a node from a parsed config
    pub fn create_node(&mut self, tag: NodeTag, config: NodeConfig) -> Result<&Node, GraphError> {
        if self.nodes.contains_key(&tag) {
            return Err(GraphError::DuplicateTag(tag));
        }
        let node = Node::from_config(tag, config)?;
        tracing::debug!(%tag, kind = node.kind.name(), "created node");
        Ok(self.nodes.entry(tag).or_insert(node))
    }

    /// Create a node from its JSON config
    pub fn create_node_from_json(
        &mut self,
        tag: NodeTag,
        config: &serde_json::Value,
    ) -> Result<&Node, GraphError> {
        if self.nodes.contains_key(&tag) {
            return Err(GraphError::DuplicateTag(tag));
        }
        self.create_node(tag, NodeConfig::from_json(config)?)
    }

    /// Make `child` an input of `parent`.
    ///
    /// Connecting an existing edge again is a no-op.
    pub fn connect(&mut self, parent: NodeTag, child: NodeTag) -> Result<(), GraphError> {
        self.find_node(parent)?;
        if self.find_node(child)?.is_sink() {
            return Err(GraphError::SinkAsInput(child));
        }
        if self.edges.contains(parent, child) {
            return Ok(());
        }
        if parent == child || self.edges.is_ancestor(child, parent) {
            return Err(GraphError::Cycle { parent, child });
        }

        self.edges.link(parent, child);
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.attach_input(child);
        }
        self.updated.insert(parent);
        tracing::trace!(%parent, %child, "connected");
        Ok(())
    }

    /// Remove the edge `parent` reads `child`
    pub fn disconnect(&mut self, parent: NodeTag, child: NodeTag) -> Result<(), GraphError> {
        self.find_node(parent)?;
        self.find_node(child)?;
        if !self.edges.unlink(parent, child) {
            return Err(GraphError::EdgeNotFound { parent, child });
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.forget_input(child);
        }
        self.updated.insert(parent);
        tracing::trace!(%parent, %child, "disconnected");
        Ok(())
    }

    /// Destroy a node.
    ///
    /// Fails with [`GraphError::NodeInUse`] while any holder still refers to
    /// the tag. Every edge and every stored reference to the tag is removed.
    pub fn drop_node(&mut self, tag: NodeTag, holders: &[&dyn TagHolder]) -> Result<Node, GraphError> {
        self.find_node(tag)?;
        if let Some(holder) = holders.iter().find(|h| h.holds(tag)) {
            return Err(GraphError::NodeInUse {
                tag,
                holder: holder.name().to_string(),
            });
        }

        let removed = self.edges.detach(tag);
        for connection in &removed {
            if connection.child == tag {
                self.updated.insert(connection.parent);
            }
        }
        for node in self.nodes.values_mut() {
            node.forget_input(tag);
        }
        self.updated.shift_remove(&tag);

        let node = self
            .nodes
            .shift_remove(&tag)
            .ok_or(GraphError::UnknownNode(tag))?;
        tracing::debug!(%tag, edges = removed.len(), "dropped node");
        Ok(node)
    }

    /// Look up a node
    pub fn find_node(&self, tag: NodeTag) -> Result<&Node, GraphError> {
        self.nodes.get(&tag).ok_or(GraphError::UnknownNode(tag))
    }

    /// Look up a node mutably
    pub fn find_node_mut(&mut self, tag: NodeTag) -> Result<&mut Node, GraphError> {
        self.nodes.get_mut(&tag).ok_or(GraphError::UnknownNode(tag))
    }

    /// Get a node if it exists
    pub fn node(&self, tag: NodeTag) -> Option<&Node> {
        self.nodes.get(&tag)
    }

    /// Check if a node exists
    pub fn contains(&self, tag: NodeTag) -> bool {
        self.nodes.contains_key(&tag)
    }

    /// Iterate over all nodes
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Number of live nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.edge_count()
    }

    /// Inputs of a node
    pub fn children_of(&self, tag: NodeTag) -> Vec<NodeTag> {
        self.edges.children_of(tag).collect()
    }

    /// Dependents of a node
    pub fn parents_of(&self, tag: NodeTag) -> Vec<NodeTag> {
        self.edges.parents_of(tag).collect()
    }

    /// All edges
    pub fn connections(&self) -> Vec<Connection> {
        self.edges.connections().collect()
    }

    /// Observed value (base plus offset) of a node
    pub fn observed_value(&self, tag: NodeTag) -> Result<f64, GraphError> {
        Ok(self.find_node(tag)?.value())
    }

    /// Set the base value of a value-holding node.
    ///
    /// Returns whether the value changed; only a change marks the node.
    pub fn set_base_value(&mut self, tag: NodeTag, value: f64) -> Result<bool, GraphError> {
        let node = self.value_node_mut(tag)?;
        let changed = node.set_base_value(value);
        if changed {
            self.updated.insert(tag);
        }
        Ok(changed)
    }

    /// Set the offset of a value-holding node
    pub fn set_offset(&mut self, tag: NodeTag, offset: f64) -> Result<bool, GraphError> {
        let node = self.value_node_mut(tag)?;
        let changed = node.set_offset(offset);
        if changed {
            self.updated.insert(tag);
        }
        Ok(changed)
    }

    /// Merge the offset into the base value
    pub fn flatten_offset(&mut self, tag: NodeTag) -> Result<(), GraphError> {
        self.value_node_mut(tag)?.flatten_offset();
        self.updated.insert(tag);
        Ok(())
    }

    /// Move the base value into the offset
    pub fn extract_offset(&mut self, tag: NodeTag) -> Result<(), GraphError> {
        self.value_node_mut(tag)?.extract_offset();
        self.updated.insert(tag);
        Ok(())
    }

    /// Attach a props node to a view
    pub fn connect_to_view(&mut self, tag: NodeTag, view: ViewId) -> Result<(), GraphError> {
        let NodeKind::Props(props) = &mut self.find_node_mut(tag)?.kind else {
            return Err(GraphError::InvalidConfig(format!(
                "node {tag} is not a props node"
            )));
        };
        match props.view {
            Some(current) if current == view => return Ok(()),
            Some(current) => {
                return Err(GraphError::InvalidConfig(format!(
                    "props node {tag} is already attached to {current}"
                )))
            }
            None => {}
        }
        props.view = Some(view);
        props.last_sent = None;
        self.updated.insert(tag);
        tracing::debug!(%tag, %view, "props node attached");
        Ok(())
    }

    /// Detach a props node from its view
    pub fn disconnect_from_view(&mut self, tag: NodeTag, view: ViewId) -> Result<(), GraphError> {
        let NodeKind::Props(props) = &mut self.find_node_mut(tag)?.kind else {
            return Err(GraphError::InvalidConfig(format!(
                "node {tag} is not a props node"
            )));
        };
        if props.view != Some(view) {
            return Err(GraphError::ViewNotConnected { tag, view });
        }
        props.view = None;
        props.last_sent = None;
        tracing::debug!(%tag, %view, "props node detached");
        Ok(())
    }

    /// Mark a node so the next propagation recomputes it and its dependents
    pub fn mark_updated(&mut self, tag: NodeTag) -> Result<(), GraphError> {
        self.find_node(tag)?;
        self.updated.insert(tag);
        Ok(())
    }

    /// Whether any node awaits propagation
    pub fn has_pending_updates(&self) -> bool {
        !self.updated.is_empty()
    }

    fn value_node_mut(&mut self, tag: NodeTag) -> Result<&mut Node, GraphError> {
        let node = self.find_node_mut(tag)?;
        if !node.holds_value() {
            return Err(GraphError::InvalidConfig(format!(
                "{} node {tag} does not hold a value",
                node.kind.name()
            )));
        }
        Ok(node)
    }
}

/// Error from a graph operation.
///
/// A failed operation leaves the graph unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// No live node has this tag
    #[error("Unknown node: {0}")]
    UnknownNode(NodeTag),

    /// Tag already used by a live node
    #[error("Duplicate tag: {0}")]
    DuplicateTag(NodeTag),

    /// Edge would make a node its own ancestor
    #[error("Connecting {parent} to {child} would create a cycle")]
    Cycle {
        /// Dependent node
        parent: NodeTag,
        /// Input node
        child: NodeTag,
    },

    /// Malformed node configuration
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Node is still referenced outside the graph
    #[error("Node {tag} is still referenced by {holder}")]
    NodeInUse {
        /// Node being dropped
        tag: NodeTag,
        /// What still refers to it
        holder: String,
    },

    /// No such edge
    #[error("No edge from {parent} to {child}")]
    EdgeNotFound {
        /// Dependent node
        parent: NodeTag,
        /// Input node
        child: NodeTag,
    },

    /// Props nodes are sinks
    #[error("Props node {0} cannot be an input")]
    SinkAsInput(NodeTag),

    /// Props node is not attached to that view
    #[error("Props node {tag} is not connected to {view}")]
    ViewNotConnected {
        /// Props node
        tag: NodeTag,
        /// View named by the caller
        view: ViewId,
    },
}
