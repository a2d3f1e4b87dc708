//! In-memory fakes for storage traits (testing only)
//!
//! `MemoryStateStore` satisfies the `StateStore` contract without touching
//! the filesystem, and can be told to fail writes so callers can exercise
//! their flush-error paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::storage_traits::{StateStore, StorageResult};

/// In-memory named-blob store backed by a `HashMap<key, blob>`.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    blobs: Mutex<HashMap<String, String>>,
    fail_writes: AtomicBool,
    writes: AtomicU64,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a blob, bypassing the write counter.
    pub fn with_blob(self, key: &str, blob: impl Into<String>) -> Self {
        self.lock().insert(key.to_string(), blob.into());
        self
    }

    /// Make every subsequent `set` fail with `StorageError::Backend`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `set` calls so far.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Current blob under `key` without going through the async trait.
    pub fn peek(&self, key: &str) -> Option<String> {
        self.lock().get(key).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        // A poisoned map only means a test panicked mid-write; the data is still usable.
        self.blobs.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        Ok(self.lock().get(key).cloned())
    }

    async fn set(&self, key: &str, blob: String) -> StorageResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!(
                "write to {key:?} rejected (injected failure)"
            )));
        }
        self.lock().insert(key.to_string(), blob);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
