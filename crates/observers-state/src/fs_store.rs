use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::StorageError;
use crate::storage_traits::{StateStore, StorageResult};

/// Filesystem-backed named-blob store.
///
/// Layout: `<root>/<key>.json`. Writes go to a temp file in `root` and are
/// renamed over the target, so a reader never sees a half-written blob.
#[derive(Debug, Clone)]
pub struct FsStateStore {
    root: PathBuf,
}

impl FsStateStore {
    /// Create a new `FsStateStore` rooted at `root`. Creates `root` if needed.
    pub fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the blob file for `key`.
    pub fn blob_path(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(format!("{key}.json")))
    }
}

fn validate_key(key: &str) -> StorageResult<()> {
    let invalid = |reason: &str| StorageError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    };
    if key.is_empty() {
        return Err(invalid("key must not be empty"));
    }
    if key.starts_with('.') {
        return Err(invalid("key must not start with '.'"));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(invalid("only ASCII letters, digits, '_', '-' and '.' are allowed"));
    }
    Ok(())
}

#[async_trait]
impl StateStore for FsStateStore {
    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let path = self.blob_path(key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(blob) => {
                debug!(key = %key, bytes = blob.len(), "state blob read");
                Ok(Some(blob))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn set(&self, key: &str, blob: String) -> StorageResult<()> {
        let path = self.blob_path(key)?;
        let root = self.root.clone();
        let bytes = blob.len();

        tokio::task::spawn_blocking(move || -> StorageResult<()> {
            std::fs::create_dir_all(&root)?;
            // Atomic write: temp file in the same directory, then rename.
            let mut tmp = NamedTempFile::new_in(&root)?;
            tmp.write_all(blob.as_bytes())?;
            tmp.flush()?;
            tmp.persist(&path).map_err(|e| e.error)?;
            Ok(())
        })
        .await
        .map_err(|e| StorageError::Backend(format!("blocking write task failed: {e}")))??;

        debug!(key = %key, bytes = bytes, "state blob written");
        Ok(())
    }
}
