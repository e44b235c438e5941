//! Content-addressed storage for sealed envelopes.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::TransportError;
use crate::types::ContentId;

/// Immutable blob store keyed by content hash.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn put(&self, bytes: &[u8]) -> Result<ContentId, TransportError>;
    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, TransportError>;
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct InMemoryContentStore {
    blobs: RwLock<HashMap<ContentId, Vec<u8>>>,
}

impl InMemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.blobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.blobs.read().await.is_empty()
    }

    /// Overwrite a stored blob in place. Test hook for integrity checks.
    #[doc(hidden)]
    pub async fn corrupt(&self, id: &ContentId, bytes: Vec<u8>) {
        self.blobs.write().await.insert(id.clone(), bytes);
    }
}

#[async_trait]
impl ContentStore for InMemoryContentStore {
    async fn put(&self, bytes: &[u8]) -> Result<ContentId, TransportError> {
        let id = ContentId::for_bytes(bytes);
        self.blobs
            .write()
            .await
            .entry(id.clone())
            .or_insert_with(|| bytes.to_vec());
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, TransportError> {
        let bytes = self
            .blobs
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(id.clone()))?;
        if !id.matches(&bytes) {
            return Err(TransportError::IntegrityMismatch(id.clone()));
        }
        Ok(bytes)
    }
}

// ---------------------------------------------------------------------------
// File store
// ---------------------------------------------------------------------------

/// One file per blob.
///
/// ```text
/// content/
///   {content_id}.bin
/// ```
pub struct FileContentStore {
    dir: PathBuf,
}

impl FileContentStore {
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, TransportError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn blob_path(&self, id: &ContentId) -> PathBuf {
        self.dir.join(format!("{}.bin", id))
    }
}

#[async_trait]
impl ContentStore for FileContentStore {
    async fn put(&self, bytes: &[u8]) -> Result<ContentId, TransportError> {
        let id = ContentId::for_bytes(bytes);
        let path = self.blob_path(&id);
        if tokio::fs::try_exists(&path).await? {
            return Ok(id);
        }
        // Atomic write: write to temp, then rename
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(id)
    }

    async fn get(&self, id: &ContentId) -> Result<Vec<u8>, TransportError> {
        let bytes = match tokio::fs::read(self.blob_path(id)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransportError::NotFound(id.clone()))
            }
            Err(e) => return Err(e.into()),
        };
        if !id.matches(&bytes) {
            return Err(TransportError::IntegrityMismatch(id.clone()));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exercise(store: &dyn ContentStore) {
        let id = store.put(b"sealed bytes").await.unwrap();
        assert_eq!(id, ContentId::for_bytes(b"sealed bytes"));
        assert_eq!(store.get(&id).await.unwrap(), b"sealed bytes");
        // Same bytes, same address.
        assert_eq!(store.put(b"sealed bytes").await.unwrap(), id);

        let missing = ContentId::for_bytes(b"never stored");
        assert!(matches!(store.get(&missing).await, Err(TransportError::NotFound(_))));
    }

    #[tokio::test]
    async fn in_memory_store() {
        let store = InMemoryContentStore::new();
        exercise(&store).await;
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileContentStore::new(dir.path()).await.unwrap();
        exercise(&store).await;
    }

    #[tokio::test]
    async fn corrupted_blob_detected() {
        let store = InMemoryContentStore::new();
        let id = store.put(b"original").await.unwrap();
        store.corrupt(&id, b"changed".to_vec()).await;
        assert!(matches!(store.get(&id).await, Err(TransportError::IntegrityMismatch(_))));

        let dir = tempfile::tempdir().unwrap();
        let files = FileContentStore::new(dir.path()).await.unwrap();
        let id = files.put(b"original").await.unwrap();
        std::fs::write(dir.path().join(format!("{}.bin", id)), b"changed").unwrap();
        assert!(matches!(files.get(&id).await, Err(TransportError::IntegrityMismatch(_))));
    }

    #[test]
    fn content_id_parsing() {
        let id = ContentId::for_bytes(b"x");
        assert_eq!(ContentId::parse(&id.as_str().to_uppercase()).unwrap(), id);
        assert!(ContentId::parse("abc").is_err());
        assert!(ContentId::parse(&"g".repeat(64)).is_err());
    }
}
