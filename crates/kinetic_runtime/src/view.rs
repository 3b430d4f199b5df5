// SPDX-License-Identifier: MIT OR Apache-2.0
//! Seam toward the view-property application layer.

use kinetic_graph::{PropMap, ViewId};
use parking_lot::Mutex;
use std::sync::Arc;

/// Property updates produced by one tick
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameBatch {
    /// Frame counter of the tick that produced the batch
    pub frame: u64,
    /// One entry per props node, in flush order
    pub updates: Vec<(ViewId, PropMap)>,
}

impl FrameBatch {
    /// Whether the batch carries nothing
    pub fn is_empty(&self) -> bool {
        self.updates.is_empty()
    }

    /// Updates addressed to one view
    pub fn for_view(&self, view: ViewId) -> impl Iterator<Item = &PropMap> {
        self.updates
            .iter()
            .filter(move |(v, _)| *v == view)
            .map(|(_, props)| props)
    }
}

/// Applies property updates to rendered views
pub trait ViewUpdater: Send {
    /// Apply one tick's updates
    fn apply(&mut self, batch: FrameBatch);
}

impl<F> ViewUpdater for F
where
    F: FnMut(FrameBatch) + Send,
{
    fn apply(&mut self, batch: FrameBatch) {
        self(batch);
    }
}

/// View updater that keeps every batch it receives
#[derive(Debug, Clone, Default)]
pub struct RecordingViewUpdater {
    batches: Arc<Mutex<Vec<FrameBatch>>>,
}

impl RecordingViewUpdater {
    /// Create an empty recorder
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches received so far
    pub fn batches(&self) -> Vec<FrameBatch> {
        self.batches.lock().clone()
    }

    /// Remove and return the batches received so far
    pub fn take(&self) -> Vec<FrameBatch> {
        std::mem::take(&mut *self.batches.lock())
    }

    /// Number of batches received
    pub fn len(&self) -> usize {
        self.batches.lock().len()
    }

    /// Whether nothing was received
    pub fn is_empty(&self) -> bool {
        self.batches.lock().is_empty()
    }
}

impl ViewUpdater for RecordingViewUpdater {
    fn apply(&mut self, batch: FrameBatch) {
        self.batches.lock().push(batch);
    }
}
