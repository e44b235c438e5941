//! Audit logging: every custody step emits a structured event.

use crate::types::{ContentId, DocumentId, NamespaceId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Seed for the integrity chain's first `prev_hash`.
const GENESIS: &[u8] = b"custody-audit-genesis";

// ---------------------------------------------------------------------------
// Audit events
// ---------------------------------------------------------------------------

/// What happened.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditAction {
    RootTokenIssued { expires_at: i64 },
    NamespaceCreated,
    NamespaceVerified,
    DelegationIssued { audience: String, command: String },
    TokenVerified,
    TokenRejected { reason: String },
    ShareStored { nodes: usize },
    ShareRead,
    ShareReadDenied { reason: String },
    ShareVerified,
    ContentStored { bytes: usize },
    ContentFetched { bytes: usize },
    ContentDecrypted,
    DecryptionFailed,
}

/// A structured audit event.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    /// When it happened.
    pub timestamp: DateTime<Utc>,
    pub namespace: Option<NamespaceId>,
    pub document: Option<DocumentId>,
    pub content_id: Option<ContentId>,
    /// What happened.
    pub action: AuditAction,
    /// DID or component that triggered this.
    pub actor: String,
    /// Success or failure.
    pub success: bool,
    /// Additional context.
    pub detail: Option<String>,
    /// Monotonic sequence number (populated by integrity chain sink).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence: Option<u64>,
    /// SHA-256 hash of the previous event's JSON (populated by integrity chain sink).
    /// First event in chain has prev_hash = SHA-256("custody-audit-genesis").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prev_hash: Option<String>,
}

impl AuditEvent {
    pub fn new(action: AuditAction) -> Self {
        Self {
            timestamp: Utc::now(),
            namespace: None,
            document: None,
            content_id: None,
            action,
            actor: "system".into(),
            success: true,
            detail: None,
            sequence: None,
            prev_hash: None,
        }
    }

    pub fn with_namespace(mut self, namespace: NamespaceId) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn with_document(mut self, document: DocumentId) -> Self {
        self.document = Some(document);
        self
    }

    pub fn with_content(mut self, content_id: ContentId) -> Self {
        self.content_id = Some(content_id);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn with_failure(mut self) -> Self {
        self.success = false;
        self
    }
}

// ---------------------------------------------------------------------------
// Audit sink trait
// ---------------------------------------------------------------------------

/// Where audit events go.
///
/// Synchronous so it can be called from inside sync custody backends.
/// For async sinks, use interior mutability (e.g., channel-based).
pub trait AuditSinkSync: Send + Sync {
    fn record(&self, event: AuditEvent);
}

// ---------------------------------------------------------------------------
// Built-in sinks
// ---------------------------------------------------------------------------

/// Logs events via the `tracing` crate.
pub struct TracingAuditSink;

impl AuditSinkSync for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        tracing::info!(
            timestamp = %event.timestamp,
            namespace = ?event.namespace,
            document = ?event.document,
            content_id = ?event.content_id,
            action = ?event.action,
            actor = %event.actor,
            success = event.success,
            detail = ?event.detail,
            "audit"
        );
    }
}

/// Collects events in memory (for testing).
pub struct InMemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
    dropped: AtomicUsize,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            dropped: AtomicUsize::new(0),
        }
    }

    /// Events lost because a reader held the lock while they were recorded.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().await.clone()
    }

    pub async fn actions(&self) -> Vec<AuditAction> {
        self.events
            .lock()
            .await
            .iter()
            .map(|e| e.action.clone())
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.lock().await.is_empty()
    }
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSinkSync for InMemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        // Never blocks the caller.
        match self.events.try_lock() {
            Ok(mut events) => events.push(event),
            Err(_) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(action = ?event.action, dropped, "in-memory audit sink busy, event dropped");
            }
        }
    }
}

/// Writes JSON events to a file (append-only, one event per line).
pub struct FileAuditSink {
    path: std::path::PathBuf,
}

impl FileAuditSink {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AuditSinkSync for FileAuditSink {
    fn record(&self, event: AuditEvent) {
        use std::io::Write;
        let json = match serde_json::to_string(&event) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "audit serialize failed");
                return;
            }
        };
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
        {
            Ok(mut file) => {
                if let Err(e) = writeln!(file, "{}", json) {
                    tracing::warn!(path = ?self.path, error = %e, "audit write failed");
                }
            }
            Err(e) => tracing::warn!(path = ?self.path, error = %e, "audit file open failed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Integrity chain sink (tamper-evident audit log)
// ---------------------------------------------------------------------------

/// Wraps any `AuditSinkSync` and adds a SHA-256 hash chain.
///
/// Each event gets a monotonic `sequence` number and a `prev_hash`
/// containing the SHA-256 hex digest of the previous event's JSON.
/// [`verify_chain`] replays a log and recomputes the hashes.
pub struct IntegrityChainSink {
    inner: Arc<dyn AuditSinkSync>,
    state: std::sync::Mutex<ChainState>,
}

struct ChainState {
    sequence: u64,
    prev_hash: String,
}

fn genesis_hash() -> String {
    format!("{:x}", Sha256::digest(GENESIS))
}

impl IntegrityChainSink {
    pub fn new(inner: Arc<dyn AuditSinkSync>) -> Self {
        Self {
            inner,
            state: std::sync::Mutex::new(ChainState {
                sequence: 0,
                prev_hash: genesis_hash(),
            }),
        }
    }
}

impl AuditSinkSync for IntegrityChainSink {
    fn record(&self, mut event: AuditEvent) {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        event.sequence = Some(state.sequence);
        event.prev_hash = Some(state.prev_hash.clone());

        // Hash covers the complete event JSON, sequence and prev_hash included.
        if let Ok(json) = serde_json::to_string(&event) {
            state.prev_hash = format!("{:x}", Sha256::digest(json.as_bytes()));
        }
        state.sequence += 1;

        drop(state);
        self.inner.record(event);
    }
}

/// Check a log written through [`IntegrityChainSink`]. Returns the index of
/// the first event that breaks the chain.
pub fn verify_chain(events: &[AuditEvent]) -> Result<(), usize> {
    let mut expected = genesis_hash();
    for (i, event) in events.iter().enumerate() {
        if event.sequence != Some(i as u64) || event.prev_hash.as_deref() != Some(expected.as_str()) {
            return Err(i);
        }
        let json = serde_json::to_string(event).map_err(|_| i)?;
        expected = format!("{:x}", Sha256::digest(json.as_bytes()));
    }
    Ok(())
}
