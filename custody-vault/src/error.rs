//! Error types for custody, transport, configuration and the orchestrator.

use custody_envelope::{EnvelopeError, KeyDerivationError, TokenError};
use thiserror::Error;

use crate::types::{ContentId, DocumentId, NamespaceId};

// ---------------------------------------------------------------------------
// Key custody
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum CustodyError {
    /// Token is valid but does not grant this operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("namespace not found: {0}")]
    NamespaceNotFound(NamespaceId),
    /// Configured namespace exists but is not owned by the builder.
    #[error("namespace {0} is not registered to this builder")]
    NamespaceNotRegistered(NamespaceId),
    #[error("document not found: {namespace}/{document}")]
    DocumentNotFound {
        namespace: NamespaceId,
        document: DocumentId,
    },
    #[error("document already exists: {namespace}/{document}")]
    DuplicateDocument {
        namespace: NamespaceId,
        document: DocumentId,
    },
    #[error("unauthorized: {0}")]
    Unauthorized(#[from] TokenError),
    /// Share read back differs from what was stored.
    #[error("stored share does not match the submitted secret")]
    ShareMismatch,
    #[error("custody backend error: {0}")]
    Backend(String),
}

// ---------------------------------------------------------------------------
// Content transport
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("content not found: {0}")]
    NotFound(ContentId),
    /// Stored bytes no longer hash to their content id.
    #[error("content {0} failed its integrity check")]
    IntegrityMismatch(ContentId),
    #[error("content io: {0}")]
    Io(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),
    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

/// Anything a custody run can fail with.
#[derive(Debug, Error)]
pub enum VaultError {
    #[error(transparent)]
    KeyDerivation(#[from] KeyDerivationError),
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error(transparent)]
    Custody(#[from] CustodyError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
