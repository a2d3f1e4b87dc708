//! Storage trait definitions for observer state
//!
//! `StateStore` is the narrow capability the observation store consumes:
//! read a named blob, overwrite a named blob. Calls are async because real
//! backends suspend on I/O; the in-memory fake in `fakes` satisfies the same
//! contract for tests.

use async_trait::async_trait;

use crate::error::StorageError;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Named-blob store.
///
/// Guarantees:
/// - `get(key)` returns `None` when nothing was ever set under `key`.
/// - `get(key)` after a successful `set(key, blob)` returns exactly `blob`.
/// - `set` replaces the whole blob; there is no partial update.
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Read the blob stored under `key`, if any.
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Overwrite the blob stored under `key`.
    async fn set(&self, key: &str, blob: String) -> StorageResult<()>;
}
