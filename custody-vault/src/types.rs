//! Core types: NamespaceId, DocumentId, ContentId, Acl, share records, receipts.

use chrono::{DateTime, Utc};
use custody_envelope::{Did, Token};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use zeroize::Zeroizing;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A builder-owned collection of share documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NamespaceId(Uuid);

impl NamespaceId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl FromStr for NamespaceId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl fmt::Display for NamespaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One share document inside a namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Content address: SHA-256 (hex) of the stored bytes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    pub fn for_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        let text = text.trim().to_ascii_lowercase();
        if text.len() != 64 || !text.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("content id must be 64 hex characters, got {text:?}"));
        }
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True if `bytes` hash to this id.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        Self::for_bytes(bytes) == *self
    }
}

impl TryFrom<String> for ContentId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<ContentId> for String {
    fn from(id: ContentId) -> Self {
        id.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Access control
// ---------------------------------------------------------------------------

/// Grant on a share document for one identity other than its owner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acl {
    pub grantee: Did,
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl Acl {
    /// What the builder gets on a user's share: execute only, never read.
    pub fn execute_only(grantee: Did) -> Self {
        Self {
            grantee,
            read: false,
            write: false,
            execute: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Namespaces
// ---------------------------------------------------------------------------

/// Request to create a namespace.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamespaceSpec {
    pub name: String,
    pub schema: serde_json::Value,
}

impl NamespaceSpec {
    /// Owned collection whose documents carry an `_id` and a secret-shared
    /// `key` field.
    pub fn secret_keys(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: serde_json::json!({
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "_id": { "type": "string", "format": "uuid" },
                        "key": {
                            "type": "object",
                            "properties": { "%share": { "type": "string" } },
                            "required": ["%share"]
                        }
                    },
                    "required": ["_id", "key"]
                }
            }),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NamespaceRecord {
    pub id: NamespaceId,
    pub name: String,
    pub owner: Did,
    pub schema: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// Result of [`crate::CustodyOrchestrator::ensure_namespace`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamespaceStatus {
    /// Configured namespace exists and belongs to the builder.
    Ready(NamespaceId),
    /// Nothing was configured; this namespace was just created and should be
    /// saved into the configuration.
    Created(NamespaceId),
}

impl NamespaceStatus {
    pub fn id(&self) -> NamespaceId {
        match self {
            Self::Ready(id) | Self::Created(id) => *id,
        }
    }
}

// ---------------------------------------------------------------------------
// Shares
// ---------------------------------------------------------------------------

/// Submission of a secret to custody.
pub struct StoreShare {
    pub owner: Did,
    pub acl: Acl,
    pub namespace: NamespaceId,
    pub document: DocumentId,
    pub data: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for StoreShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreShare")
            .field("owner", &self.owner)
            .field("acl", &self.acl)
            .field("namespace", &self.namespace)
            .field("document", &self.document)
            .field("data", &"[REDACTED]")
            .finish()
    }
}

/// What a single custody node keeps for a document: its share of the secret
/// and the access rules.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRecord {
    pub namespace: NamespaceId,
    pub document: DocumentId,
    pub owner: Did,
    pub acl: Vec<Acl>,
    /// Node-local share, hex.
    pub share_hex: String,
    pub created_at: DateTime<Utc>,
}

impl ShareRecord {
    /// Owner, or an ACL entry with read.
    pub fn can_read(&self, did: &Did) -> bool {
        &self.owner == did || self.acl.iter().any(|a| &a.grantee == did && a.read)
    }
}

// ---------------------------------------------------------------------------
// Receipts
// ---------------------------------------------------------------------------

/// Everything needed to recover a sealed file later.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CustodyReceipt {
    pub content_id: ContentId,
    pub token: Token,
    pub namespace: NamespaceId,
    pub document: DocumentId,
    pub user_did: Did,
}
