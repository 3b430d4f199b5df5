// SPDX-License-Identifier: MIT OR Apache-2.0
//! Connection (edge) bookkeeping for the graph.

use crate::node::NodeTag;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// A dependency edge: `parent` reads `child`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    /// Dependent node
    pub parent: NodeTag,
    /// Input node
    pub child: NodeTag,
}

impl Connection {
    /// Create a new connection
    pub fn new(parent: NodeTag, child: NodeTag) -> Self {
        Self { parent, child }
    }

    /// Check if this connection involves a specific node
    pub fn involves_node(&self, tag: NodeTag) -> bool {
        self.parent == tag || self.child == tag
    }
}

/// Adjacency in both directions, keyed by tag
#[derive(Debug, Clone, Default)]
pub struct Adjacency {
    /// Node to its inputs
    children: IndexMap<NodeTag, IndexSet<NodeTag>>,
    /// Node to its dependents
    parents: IndexMap<NodeTag, IndexSet<NodeTag>>,
}

impl Adjacency {
    /// Create an empty adjacency
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an edge. Returns false if it already existed.
    pub fn link(&mut self, parent: NodeTag, child: NodeTag) -> bool {
        let added = self.children.entry(parent).or_default().insert(child);
        self.parents.entry(child).or_default().insert(parent);
        added
    }

    /// Remove an edge. Returns false if it did not exist.
    pub fn unlink(&mut self, parent: NodeTag, child: NodeTag) -> bool {
        let removed = self
            .children
            .get_mut(&parent)
            .is_some_and(|set| set.shift_remove(&child));
        if let Some(set) = self.parents.get_mut(&child) {
            set.shift_remove(&parent);
        }
        removed
    }

    /// Check whether `parent` reads `child`
    pub fn contains(&self, parent: NodeTag, child: NodeTag) -> bool {
        self.children.get(&parent).is_some_and(|set| set.contains(&child))
    }

    /// Inputs of a node
    pub fn children_of(&self, tag: NodeTag) -> impl Iterator<Item = NodeTag> + '_ {
        self.children.get(&tag).into_iter().flatten().copied()
    }

    /// Dependents of a node
    pub fn parents_of(&self, tag: NodeTag) -> impl Iterator<Item = NodeTag> + '_ {
        self.parents.get(&tag).into_iter().flatten().copied()
    }

    /// Remove every edge touching `tag` and return them
    pub fn detach(&mut self, tag: NodeTag) -> Vec<Connection> {
        let mut removed = Vec::new();
        if let Some(children) = self.children.swap_remove(&tag) {
            for child in children {
                if let Some(set) = self.parents.get_mut(&child) {
                    set.shift_remove(&tag);
                }
                removed.push(Connection::new(tag, child));
            }
        }
        if let Some(parents) = self.parents.swap_remove(&tag) {
            for parent in parents {
                if let Some(set) = self.children.get_mut(&parent) {
                    set.shift_remove(&tag);
                }
                removed.push(Connection::new(parent, tag));
            }
        }
        removed
    }

    /// Whether `ancestor` depends, directly or transitively, on `tag`
    pub fn is_ancestor(&self, ancestor: NodeTag, tag: NodeTag) -> bool {
        let mut visited = IndexSet::new();
        let mut queue = VecDeque::from([tag]);
        while let Some(current) = queue.pop_front() {
            for parent in self.parents_of(current) {
                if parent == ancestor {
                    return true;
                }
                if visited.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }
        false
    }

    /// All edges
    pub fn connections(&self) -> impl Iterator<Item = Connection> + '_ {
        self.children
            .iter()
            .flat_map(|(parent, set)| set.iter().map(move |child| Connection::new(*parent, *child)))
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.children.values().map(IndexSet::len).sum()
    }
}
