//! Unified error types for the custody envelope and token layer.
//!
//! Messages never carry key material. Envelope failures stay coarse on
//! purpose: a caller can tell "too short" from "did not authenticate", but not
//! which byte was wrong.

use thiserror::Error;

/// Turning secret material into a symmetric key failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum KeyDerivationError {
    /// Secret text was empty or not valid hex.
    #[error("malformed secret: expected non-empty hex")]
    MalformedSecret,
    /// Digest did not have the expected 32-byte length.
    #[error("derived key has invalid length {0}, expected 32")]
    InvalidKeyLength(usize),
}

/// Sealing or opening an envelope failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum EnvelopeError {
    /// Input shorter than the fixed nonce + tag header.
    #[error("envelope too short: {0} bytes, need at least 32")]
    EnvelopeTooShort(usize),
    /// Tag did not verify: tampered data, wrong key or wrong nonce.
    #[error("envelope authentication failed")]
    AuthenticationFailed,
    /// The OS random source could not produce a nonce.
    #[error("secure random source unavailable")]
    Entropy,
}

/// Issuing or verifying a capability token failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TokenError {
    #[error("command {child} is not covered by parent command {parent}")]
    CommandNotSubset { parent: String, child: String },
    #[error("expiry {child} exceeds parent expiry {parent}")]
    ExpiryExceedsParent { parent: i64, child: i64 },
    #[error("token chain invalid: {0}")]
    ChainInvalid(String),
    #[error("token expired at {expired_at} (now {now})")]
    Expired { expired_at: i64, now: i64 },
    #[error("token chain rooted at untrusted identity {0}")]
    UntrustedRoot(String),
    #[error("invocation tokens cannot be extended")]
    TerminalParent,
    #[error("signer {signer} is not the audience {audience} of the parent token")]
    NotParentAudience { signer: String, audience: String },
    #[error("token chain deeper than {0} links")]
    ChainTooDeep(usize),
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),
    #[error("malformed token: {0}")]
    Malformed(String),
}

impl From<KeyDerivationError> for TokenError {
    fn from(e: KeyDerivationError) -> Self {
        TokenError::InvalidIdentity(e.to_string())
    }
}
