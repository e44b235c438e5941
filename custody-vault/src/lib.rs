//! # Custody Vault
//!
//! Key custody and the encrypt / store / recover pipeline.
//!
//! Each sealed file gets its own secret. The secret is XOR-split across
//! custody nodes under a user identity derived from it, the file is sealed
//! with a key derived from the same secret, and the envelope lands in a
//! content-addressed store. The capability token in the receipt is the only
//! thing needed to recover the plaintext.
//!
//! Built on top of `custody-envelope` for sealing and capability tokens.
//!
//! ## Quick Start
//!
//! ```no_run
//! use custody_envelope::{Command, Keypair, SystemClock};
//! use custody_vault::*;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let builder = Keypair::generate();
//! let clock = Arc::new(SystemClock);
//! let audit = Arc::new(InMemoryAuditSink::new());
//! let custody = Arc::new(LocalCustody::in_memory(3, vec![builder.did()], clock.clone(), audit.clone())?);
//! let content = Arc::new(InMemoryContentStore::new());
//!
//! let ctx = CustodyContext {
//!     builder,
//!     root_command: Command::parse("/nil")?,
//!     namespace: None,
//!     policy: TokenPolicy::default(),
//! };
//! let vault = CustodyOrchestrator::new(ctx, custody, content, clock, audit)?;
//! vault.ensure_namespace().await?;
//!
//! let receipt = vault.encrypt_bytes_and_store(b"secret data").await?;
//! let plaintext = vault.fetch_and_decrypt(&receipt.content_id, &receipt.token).await?;
//! assert_eq!(plaintext, b"secret data");
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod config;
pub mod content;
pub mod custody;
pub mod error;
pub mod orchestrator;
pub mod policy;
pub mod share;
pub mod storage;
pub mod types;

// Re-export main types for convenience
pub use audit::{
    verify_chain, AuditAction, AuditEvent, AuditSinkSync, FileAuditSink, InMemoryAuditSink,
    IntegrityChainSink, TracingAuditSink,
};
pub use config::{CustodyConfig, LogFormat};
pub use content::{ContentStore, FileContentStore, InMemoryContentStore};
pub use custody::{KeyCustody, LocalCustody};
pub use error::{ConfigError, CustodyError, TransportError, VaultError};
pub use orchestrator::{CustodyContext, CustodyOrchestrator};
pub use policy::{evaluate, TokenPolicy, TokenVerdict};
pub use storage::{FileShareBackend, InMemoryShareBackend, ShareBackend};
pub use types::{
    Acl, ContentId, CustodyReceipt, DocumentId, NamespaceId, NamespaceRecord, NamespaceSpec,
    NamespaceStatus, ShareRecord, StoreShare,
};

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
