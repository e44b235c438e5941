//! Storage backends: what a single custody node persists.

use crate::error::CustodyError;
use crate::types::{DocumentId, NamespaceId, NamespaceRecord, ShareRecord};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Storage trait
// ---------------------------------------------------------------------------

/// Backend for one custody node.
///
/// Implement this for your infrastructure:
/// - InMemoryShareBackend (testing)
/// - FileShareBackend (development)
/// - A remote node client (production)
pub trait ShareBackend: Send + Sync {
    fn get_namespace(&self, id: &NamespaceId) -> Result<Option<NamespaceRecord>, CustodyError>;
    fn put_namespace(&self, record: &NamespaceRecord) -> Result<(), CustodyError>;
    fn list_namespaces(&self) -> Result<Vec<NamespaceRecord>, CustodyError>;
    fn get_share(
        &self,
        namespace: &NamespaceId,
        document: &DocumentId,
    ) -> Result<Option<ShareRecord>, CustodyError>;
    fn put_share(&self, record: &ShareRecord) -> Result<(), CustodyError>;
}

fn lock_poisoned<T>(_: PoisonError<T>) -> CustodyError {
    CustodyError::Backend("storage lock poisoned".into())
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

/// In-memory node (for testing and ephemeral use).
pub struct InMemoryShareBackend {
    namespaces: RwLock<HashMap<NamespaceId, NamespaceRecord>>,
    shares: RwLock<HashMap<(NamespaceId, DocumentId), ShareRecord>>,
}

impl InMemoryShareBackend {
    pub fn new() -> Self {
        Self {
            namespaces: RwLock::new(HashMap::new()),
            shares: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryShareBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl ShareBackend for InMemoryShareBackend {
    fn get_namespace(&self, id: &NamespaceId) -> Result<Option<NamespaceRecord>, CustodyError> {
        let namespaces = self.namespaces.read().map_err(lock_poisoned)?;
        Ok(namespaces.get(id).cloned())
    }

    fn put_namespace(&self, record: &NamespaceRecord) -> Result<(), CustodyError> {
        let mut namespaces = self.namespaces.write().map_err(lock_poisoned)?;
        namespaces.insert(record.id, record.clone());
        Ok(())
    }

    fn list_namespaces(&self) -> Result<Vec<NamespaceRecord>, CustodyError> {
        let namespaces = self.namespaces.read().map_err(lock_poisoned)?;
        Ok(namespaces.values().cloned().collect())
    }

    fn get_share(
        &self,
        namespace: &NamespaceId,
        document: &DocumentId,
    ) -> Result<Option<ShareRecord>, CustodyError> {
        let shares = self.shares.read().map_err(lock_poisoned)?;
        Ok(shares.get(&(*namespace, *document)).cloned())
    }

    fn put_share(&self, record: &ShareRecord) -> Result<(), CustodyError> {
        let mut shares = self.shares.write().map_err(lock_poisoned)?;
        shares.insert((record.namespace, record.document), record.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File backend
// ---------------------------------------------------------------------------

/// File-based node (one JSON file per record).
///
/// Directory layout:
/// ```text
/// node/
///   namespaces/{namespace_id}.json
///   shares/{namespace_id}/{document_id}.json
/// ```
pub struct FileShareBackend {
    dir: PathBuf,
}

impl FileShareBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CustodyError> {
        let dir = dir.into();
        std::fs::create_dir_all(dir.join("namespaces"))
            .and_then(|_| std::fs::create_dir_all(dir.join("shares")))
            .map_err(|e| CustodyError::Backend(format!("create dir: {}", e)))?;
        Ok(Self { dir })
    }

    fn namespace_path(&self, id: &NamespaceId) -> PathBuf {
        self.dir.join("namespaces").join(format!("{}.json", id))
    }

    fn share_dir(&self, namespace: &NamespaceId) -> PathBuf {
        self.dir.join("shares").join(namespace.to_string())
    }

    fn share_path(&self, namespace: &NamespaceId, document: &DocumentId) -> PathBuf {
        self.share_dir(namespace).join(format!("{}.json", document))
    }

    fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CustodyError> {
        if !path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(path)
            .map_err(|e| CustodyError::Backend(format!("read: {}", e)))?;
        serde_json::from_str(&data)
            .map(Some)
            .map_err(|e| CustodyError::Backend(format!("parse: {}", e)))
    }

    fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CustodyError> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|e| CustodyError::Backend(format!("serialize: {}", e)))?;
        // Atomic write: write to temp, then rename
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, &json).map_err(|e| CustodyError::Backend(format!("write: {}", e)))?;
        std::fs::rename(&tmp, path).map_err(|e| CustodyError::Backend(format!("rename: {}", e)))?;
        Ok(())
    }

    fn read_dir_json<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, CustodyError> {
        let mut out = Vec::new();
        if !dir.exists() {
            return Ok(out);
        }
        let entries =
            std::fs::read_dir(dir).map_err(|e| CustodyError::Backend(format!("readdir: {}", e)))?;
        for entry in entries {
            let entry = entry.map_err(|e| CustodyError::Backend(format!("entry: {}", e)))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                if let Some(value) = Self::read_json(&path)? {
                    out.push(value);
                }
            }
        }
        Ok(out)
    }
}

impl ShareBackend for FileShareBackend {
    fn get_namespace(&self, id: &NamespaceId) -> Result<Option<NamespaceRecord>, CustodyError> {
        Self::read_json(&self.namespace_path(id))
    }

    fn put_namespace(&self, record: &NamespaceRecord) -> Result<(), CustodyError> {
        Self::write_json(&self.namespace_path(&record.id), record)
    }

    fn list_namespaces(&self) -> Result<Vec<NamespaceRecord>, CustodyError> {
        Self::read_dir_json(&self.dir.join("namespaces"))
    }

    fn get_share(
        &self,
        namespace: &NamespaceId,
        document: &DocumentId,
    ) -> Result<Option<ShareRecord>, CustodyError> {
        Self::read_json(&self.share_path(namespace, document))
    }

    fn put_share(&self, record: &ShareRecord) -> Result<(), CustodyError> {
        std::fs::create_dir_all(self.share_dir(&record.namespace))
            .map_err(|e| CustodyError::Backend(format!("create dir: {}", e)))?;
        Self::write_json(&self.share_path(&record.namespace, &record.document), record)
    }
}
