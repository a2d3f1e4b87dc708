//! Error types for observers-state

use thiserror::Error;

/// Errors raised by a [`crate::StateStore`] backend.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend refused or failed the operation
    #[error("storage backend failed: {0}")]
    Backend(String),

    /// Key cannot be used by this backend
    #[error("invalid state key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// Stored blob exists but cannot be interpreted
    #[error("malformed state under key {key:?}: {reason}")]
    Malformed { key: String, reason: String },

    /// Filesystem error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
