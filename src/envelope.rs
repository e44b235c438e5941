//! Sealed content envelopes.

use core::fmt;

use crate::error::EnvelopeError;
use crate::kdf::DerivedKey;
use crate::{aead, wire};

/// Seal `plaintext` under `key`.
///
/// Every call draws a fresh nonce, so sealing the same bytes twice gives two
/// different envelopes. The result is always `plaintext.len() + 32` bytes.
pub fn seal(plaintext: &[u8], key: &DerivedKey) -> Result<Vec<u8>, EnvelopeError> {
    let nonce = aead::nonce()?;
    let (tag, ciphertext) = aead::aead_seal(key.as_bytes(), &nonce, plaintext)?;
    Ok(wire::encode(&nonce, &tag, &ciphertext))
}

/// Open an envelope produced by [`seal`].
pub fn open(envelope: &[u8], key: &DerivedKey) -> Result<Vec<u8>, EnvelopeError> {
    let parts = wire::decode(envelope)?;
    aead::aead_open(key.as_bytes(), parts.nonce, parts.tag, parts.ciphertext)
}

/// Envelope metadata (no decryption).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeInfo {
    pub aead_suite: &'static str,
    pub nonce_bytes: usize,
    pub total_bytes: usize,
    pub plaintext_bytes: usize,
}

impl fmt::Display for EnvelopeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (nonce {}) | {} bytes ({} plaintext)",
            self.aead_suite, self.nonce_bytes, self.total_bytes, self.plaintext_bytes
        )
    }
}

/// Inspect envelope lengths without decrypting.
///
/// Only checks the minimum length. Does NOT reveal any secret information.
pub fn inspect(envelope: &[u8]) -> Result<EnvelopeInfo, EnvelopeError> {
    let parts = wire::decode(envelope)?;
    Ok(EnvelopeInfo {
        aead_suite: "AES-256-GCM",
        nonce_bytes: wire::NONCE_BYTES,
        total_bytes: envelope.len(),
        plaintext_bytes: parts.ciphertext.len(),
    })
}
