// SPDX-License-Identifier: MIT

//! Typed error handling for skein-rs
//!
//! This module provides the error type hierarchy used across the engine and
//! its collaborator traits.

use thiserror::Error;

/// Top-level error type for skein-rs
#[derive(Debug, Error)]
pub enum EngineError {
    /// Canvas not found in the canvas store
    #[error("Canvas '{0}' not found")]
    CanvasNotFound(String),

    /// Execution not found in the execution store
    #[error("Execution '{0}' not found")]
    ExecutionNotFound(String),

    /// Requesting user does not own the execution
    #[error("User '{uid}' does not own execution '{execution_id}'")]
    NotOwner { uid: String, execution_id: String },

    /// Persistence-layer failure
    #[error("Store error: {0}")]
    Store(String),

    /// Job queue failure
    #[error("Queue error: {0}")]
    Queue(String),

    /// Skill invocation failure
    #[error("Skill error: {0}")]
    Skill(String),

    /// Canvas store failure
    #[error("Canvas error: {0}")]
    Canvas(String),

    /// Accounting collaborator failure
    #[error("Accounting error: {0}")]
    Accounting(String),

    /// Node execution failure recorded on a node record
    #[error("Node '{node_id}' failed: {message}")]
    NodeFailed { node_id: String, message: String },

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error wrapper for compatibility
    #[error("{0}")]
    Other(String),
}

impl EngineError {
    /// Create a store error
    pub fn store(message: impl Into<String>) -> Self {
        Self::Store(message.into())
    }

    /// Create a queue error
    pub fn queue(message: impl Into<String>) -> Self {
        Self::Queue(message.into())
    }

    /// Create a skill error
    pub fn skill(message: impl Into<String>) -> Self {
        Self::Skill(message.into())
    }

    /// Create a canvas error
    pub fn canvas(message: impl Into<String>) -> Self {
        Self::Canvas(message.into())
    }

    /// Create from a generic error
    pub fn other(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }
}

// Allow conversion from &str for backward compatibility
impl From<&str> for EngineError {
    fn from(s: &str) -> Self {
        Self::Other(s.to_string())
    }
}

impl From<String> for EngineError {
    fn from(s: String) -> Self {
        Self::Other(s)
    }
}

/// Convenience alias used throughout the crate
pub type Result<T> = std::result::Result<T, EngineError>;
