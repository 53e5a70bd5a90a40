//! Checkpoint store error types.

use std::io;
use thiserror::Error;

use rakugaki_types::InvalidCheckpointId;

/// Checkpoint store error type.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Id failed validation; nothing was read or written.
    #[error("invalid checkpoint id {id:?}: {reason}")]
    InvalidId {
        id: String,
        #[source]
        reason: InvalidCheckpointId,
    },

    /// Serialized payload exceeds the backend's size limit.
    #[error("checkpoint payload is {size} bytes, over the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },

    /// Resolved path escapes the checkpoint directory (security violation).
    #[error("path escapes checkpoint directory: {0}")]
    PathEscapesRoot(String),

    /// Stored document could not be encoded or decoded.
    #[error("checkpoint serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Remote store transport failure.
    #[error("remote store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Remote store answered with an error or an unexpected shape.
    #[error("remote store error: {0}")]
    Remote(String),

    /// Backend configuration is missing or inconsistent.
    #[error("store configuration: {0}")]
    Config(String),
}

impl StoreError {
    /// Create an InvalidId error.
    pub fn invalid_id(id: impl Into<String>, reason: InvalidCheckpointId) -> Self {
        Self::InvalidId {
            id: id.into(),
            reason,
        }
    }

    /// Create a PathEscapesRoot error.
    pub fn path_escapes_root(path: impl Into<String>) -> Self {
        Self::PathEscapesRoot(path.into())
    }

    /// Create a Remote error.
    pub fn remote(msg: impl Into<String>) -> Self {
        Self::Remote(msg.into())
    }

    /// Create a Config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors raised before storage was touched.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidId { .. } | Self::TooLarge { .. } | Self::PathEscapesRoot(_)
        )
    }
}

/// Checkpoint store result type.
pub type StoreResult<T> = Result<T, StoreError>;
