// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors surfaced by the runtime.

use kinetic_drivers::DriverError;
use kinetic_graph::GraphError;

/// Error from a nodes manager operation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AnimatedError {
    /// Structural or value error from the graph
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// Rejected driver operation
    #[error(transparent)]
    Driver(#[from] DriverError),

    /// Command queue closed before the command was applied
    #[error("Command queue closed")]
    QueueClosed,
}

/// Error loading or saving engine configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Reading or writing the file failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid RON for this format
    #[error("Parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// Serializing to RON failed
    #[error("Serialize error: {0}")]
    Serialize(#[from] ron::Error),

    /// Written by a newer engine
    #[error("Config version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Newest version this build reads
        supported: u32,
    },

    /// A value is out of range
    #[error("Invalid config value: {0}")]
    Invalid(String),
}
