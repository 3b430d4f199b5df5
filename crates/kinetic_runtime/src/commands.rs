// SPDX-License-Identifier: MIT OR Apache-2.0
//! Commands marshaled onto the owning context.
//!
//! [`AnimatedModule`] is the handle other threads hold. Every call enqueues
//! a [`Command`] without blocking and wakes the frame loop if it is idle;
//! the nodes manager applies queued commands at the start of its next tick.

use crate::error::AnimatedError;
use crate::events::EventMapping;
use crate::frame_loop::LoopWaker;
use crate::manager::NodesManager;
use crate::observer::ValueObserver;
use kinetic_drivers::CompletionCallback;
use kinetic_graph::{AnimationId, NodeTag, ViewId};
use serde_json::Value;
use std::fmt;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

/// A graph operation requested from another context
pub enum Command {
    /// Create a node from its JSON config
    CreateNode {
        /// Tag of the new node
        tag: NodeTag,
        /// Node config, tagged by `"type"`
        config: Value,
    },
    /// Make `child` an input of `parent`
    Connect {
        /// Dependent node
        parent: NodeTag,
        /// Input node
        child: NodeTag,
    },
    /// Remove an input edge
    Disconnect {
        /// Dependent node
        parent: NodeTag,
        /// Input node
        child: NodeTag,
    },
    /// Attach a props node to a view
    ConnectToView {
        /// Props node
        tag: NodeTag,
        /// Target view
        view: ViewId,
    },
    /// Detach a props node from its view
    DisconnectFromView {
        /// Props node
        tag: NodeTag,
        /// Attached view
        view: ViewId,
    },
    /// Destroy a node
    DropNode {
        /// Node to destroy
        tag: NodeTag,
    },
    /// Set a value node's base value
    SetValue {
        /// Value node
        tag: NodeTag,
        /// New base value
        value: f64,
    },
    /// Set a value node's offset
    SetOffset {
        /// Value node
        tag: NodeTag,
        /// New offset
        offset: f64,
    },
    /// Merge the offset into the base value
    FlattenOffset {
        /// Value node
        tag: NodeTag,
    },
    /// Move the base value into the offset
    ExtractOffset {
        /// Value node
        tag: NodeTag,
    },
    /// Start a driver on a value node
    StartAnimation {
        /// Animation id
        id: AnimationId,
        /// Target value node
        tag: NodeTag,
        /// Driver config, tagged by `"type"`
        config: Value,
        /// Run once when the driver ends
        callback: Option<CompletionCallback>,
    },
    /// Stop a driver
    StopAnimation {
        /// Animation id
        id: AnimationId,
    },
    /// Route event payload fields into value nodes
    AddEventBinding {
        /// Source view
        view: ViewId,
        /// Event name
        event: String,
        /// Payload paths and their target nodes
        mappings: Vec<EventMapping>,
    },
    /// Remove the event bindings targeting one node
    RemoveEventBinding {
        /// Source view
        view: ViewId,
        /// Event name
        event: String,
        /// Target node
        tag: NodeTag,
    },
    /// Push a node's value to an observer on every change
    StartListening {
        /// Observed node
        tag: NodeTag,
        /// Receiver of values
        observer: Box<dyn ValueObserver>,
    },
    /// Remove a node's observer
    StopListening {
        /// Observed node
        tag: NodeTag,
    },
    /// Reset a props node's view properties to their defaults
    RestoreDefaultValues {
        /// Props node
        tag: NodeTag,
    },
    /// Dispatch a native event
    HandleEvent {
        /// Source view
        view: ViewId,
        /// Event name
        event: String,
        /// Event payload
        payload: Value,
    },
}

impl Command {
    /// Short name used in logs
    pub fn description(&self) -> &'static str {
        match self {
            Command::CreateNode { .. } => "createNode",
            Command::Connect { .. } => "connect",
            Command::Disconnect { .. } => "disconnect",
            Command::ConnectToView { .. } => "connectToView",
            Command::DisconnectFromView { .. } => "disconnectFromView",
            Command::DropNode { .. } => "dropNode",
            Command::SetValue { .. } => "setValue",
            Command::SetOffset { .. } => "setOffset",
            Command::FlattenOffset { .. } => "flattenOffset",
            Command::ExtractOffset { .. } => "extractOffset",
            Command::StartAnimation { .. } => "startAnimation",
            Command::StopAnimation { .. } => "stopAnimation",
            Command::AddEventBinding { .. } => "addEventBinding",
            Command::RemoveEventBinding { .. } => "removeEventBinding",
            Command::StartListening { .. } => "startListening",
            Command::StopListening { .. } => "stopListening",
            Command::RestoreDefaultValues { .. } => "restoreDefaultValues",
            Command::HandleEvent { .. } => "handleEvent",
        }
    }

    /// Apply the command on the owning context
    pub fn execute(self, manager: &mut NodesManager) -> Result<(), AnimatedError> {
        match self {
            Command::CreateNode { tag, config } => manager.create_node(tag, &config),
            Command::Connect { parent, child } => manager.connect(parent, child),
            Command::Disconnect { parent, child } => manager.disconnect(parent, child),
            Command::ConnectToView { tag, view } => manager.connect_to_view(tag, view),
            Command::DisconnectFromView { tag, view } => manager.disconnect_from_view(tag, view),
            Command::DropNode { tag } => manager.drop_node(tag),
            Command::SetValue { tag, value } => manager.set_value(tag, value),
            Command::SetOffset { tag, offset } => manager.set_offset(tag, offset),
            Command::FlattenOffset { tag } => manager.flatten_offset(tag),
            Command::ExtractOffset { tag } => manager.extract_offset(tag),
            Command::StartAnimation {
                id,
                tag,
                config,
                callback,
            } => manager.start_animation(id, tag, &config, callback),
            Command::StopAnimation { id } => manager.stop_animation(id),
            Command::AddEventBinding {
                view,
                event,
                mappings,
            } => manager.add_event_binding(view, &event, mappings),
            Command::RemoveEventBinding { view, event, tag } => {
                manager.remove_event_binding(view, &event, tag);
                Ok(())
            }
            Command::StartListening { tag, observer } => manager.start_listening(tag, observer),
            Command::StopListening { tag } => {
                manager.stop_listening(tag);
                Ok(())
            }
            Command::RestoreDefaultValues { tag } => manager.restore_default_values(tag),
            Command::HandleEvent {
                view,
                event,
                payload,
            } => {
                manager.handle_event(view, &event, &payload);
                Ok(())
            }
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Command").field(&self.description()).finish()
    }
}

/// A queued command that failed when applied
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFailure {
    /// Which operation failed
    pub command: &'static str,
    /// Why
    pub error: AnimatedError,
}

/// Create the command channel; sends wake the loop behind `waker`
pub(crate) fn channel(waker: LoopWaker) -> (AnimatedModule, UnboundedReceiver<Command>) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (AnimatedModule { sender, waker }, receiver)
}

/// Cloneable, thread-safe handle for requesting graph operations.
///
/// Calls never block. They only fail once the owning nodes manager is gone.
#[derive(Debug, Clone)]
pub struct AnimatedModule {
    sender: UnboundedSender<Command>,
    waker: LoopWaker,
}

impl AnimatedModule {
    /// Enqueue a raw command and request a tick to apply it
    pub fn send(&self, command: Command) -> Result<(), AnimatedError> {
        self.sender.send(command).map_err(|_| AnimatedError::QueueClosed)?;
        self.waker.wake();
        Ok(())
    }

    /// Request `createNode`
    pub fn create_node(&self, tag: NodeTag, config: Value) -> Result<(), AnimatedError> {
        self.send(Command::CreateNode { tag, config })
    }

    /// Request `connect`
    pub fn connect(&self, parent: NodeTag, child: NodeTag) -> Result<(), AnimatedError> {
        self.send(Command::Connect { parent, child })
    }

    /// Request `disconnect`
    pub fn disconnect(&self, parent: NodeTag, child: NodeTag) -> Result<(), AnimatedError> {
        self.send(Command::Disconnect { parent, child })
    }

    /// Request `connectToView`
    pub fn connect_to_view(&self, tag: NodeTag, view: ViewId) -> Result<(), AnimatedError> {
        self.send(Command::ConnectToView { tag, view })
    }

    /// Request `disconnectFromView`
    pub fn disconnect_from_view(&self, tag: NodeTag, view: ViewId) -> Result<(), AnimatedError> {
        self.send(Command::DisconnectFromView { tag, view })
    }

    /// Request `dropNode`
    pub fn drop_node(&self, tag: NodeTag) -> Result<(), AnimatedError> {
        self.send(Command::DropNode { tag })
    }

    /// Request `setValue`
    pub fn set_value(&self, tag: NodeTag, value: f64) -> Result<(), AnimatedError> {
        self.send(Command::SetValue { tag, value })
    }

    /// Request `setOffset`
    pub fn set_offset(&self, tag: NodeTag, offset: f64) -> Result<(), AnimatedError> {
        self.send(Command::SetOffset { tag, offset })
    }

    /// Request `flattenOffset`
    pub fn flatten_offset(&self, tag: NodeTag) -> Result<(), AnimatedError> {
        self.send(Command::FlattenOffset { tag })
    }

    /// Request `extractOffset`
    pub fn extract_offset(&self, tag: NodeTag) -> Result<(), AnimatedError> {
        self.send(Command::ExtractOffset { tag })
    }

    /// Request `startAnimation`
    pub fn start_animation(
        &self,
        id: AnimationId,
        tag: NodeTag,
        config: Value,
        callback: Option<CompletionCallback>,
    ) -> Result<(), AnimatedError> {
        self.send(Command::StartAnimation {
            id,
            tag,
            config,
            callback,
        })
    }

    /// Request `stopAnimation`
    pub fn stop_animation(&self, id: AnimationId) -> Result<(), AnimatedError> {
        self.send(Command::StopAnimation { id })
    }

    /// Request `addEventBinding`
    pub fn add_event_binding(
        &self,
        view: ViewId,
        event: impl Into<String>,
        mappings: Vec<EventMapping>,
    ) -> Result<(), AnimatedError> {
        self.send(Command::AddEventBinding {
            view,
            event: event.into(),
            mappings,
        })
    }

    /// Request `removeEventBinding`
    pub fn remove_event_binding(
        &self,
        view: ViewId,
        event: impl Into<String>,
        tag: NodeTag,
    ) -> Result<(), AnimatedError> {
        self.send(Command::RemoveEventBinding {
            view,
            event: event.into(),
            tag,
        })
    }

    /// Request `startListening`
    pub fn start_listening(
        &self,
        tag: NodeTag,
        observer: impl ValueObserver + 'static,
    ) -> Result<(), AnimatedError> {
        self.send(Command::StartListening {
            tag,
            observer: Box::new(observer),
        })
    }

    /// Request `stopListening`
    pub fn stop_listening(&self, tag: NodeTag) -> Result<(), AnimatedError> {
        self.send(Command::StopListening { tag })
    }

    /// Request `restoreDefaultValues`
    pub fn restore_default_values(&self, tag: NodeTag) -> Result<(), AnimatedError> {
        self.send(Command::RestoreDefaultValues { tag })
    }

    /// Forward a native event
    pub fn handle_event(
        &self,
        view: ViewId,
        event: impl Into<String>,
        payload: Value,
    ) -> Result<(), AnimatedError> {
        self.send(Command::HandleEvent {
            view,
            event: event.into(),
            payload,
        })
    }
}
