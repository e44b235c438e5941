//! Envelope wire format
//!
//! Format:
//!   nonce[16] || tag[16] || ciphertext[n]
//!
//! There is no version byte and no length prefix. The ciphertext is exactly
//! as long as the plaintext, so `len(envelope) == len(plaintext) + 32`.

use crate::error::EnvelopeError;

/// AES-256 key size.
pub const KEY_BYTES: usize = 32;

/// GCM nonce size used by this format (not the usual 12).
pub const NONCE_BYTES: usize = 16;

/// GCM authentication tag size.
pub const TAG_BYTES: usize = 16;

/// Fixed header: nonce + tag.
pub const HEADER_BYTES: usize = NONCE_BYTES + TAG_BYTES; // 32

/// Smallest valid envelope (empty plaintext).
pub const MIN_ENVELOPE_BYTES: usize = HEADER_BYTES;

/// Borrowed view of a parsed envelope.
#[derive(Debug, Clone, Copy)]
pub struct EnvelopeParts<'a> {
    pub nonce: &'a [u8; NONCE_BYTES],
    pub tag: &'a [u8; TAG_BYTES],
    pub ciphertext: &'a [u8],
}

pub fn decode(data: &[u8]) -> Result<EnvelopeParts<'_>, EnvelopeError> {
    if data.len() < MIN_ENVELOPE_BYTES {
        return Err(EnvelopeError::EnvelopeTooShort(data.len()));
    }

    let nonce: &[u8; NONCE_BYTES] = data[..NONCE_BYTES]
        .try_into()
        .map_err(|_| EnvelopeError::EnvelopeTooShort(data.len()))?;
    let tag: &[u8; TAG_BYTES] = data[NONCE_BYTES..HEADER_BYTES]
        .try_into()
        .map_err(|_| EnvelopeError::EnvelopeTooShort(data.len()))?;

    Ok(EnvelopeParts {
        nonce,
        tag,
        ciphertext: &data[HEADER_BYTES..],
    })
}

pub fn encode(nonce: &[u8; NONCE_BYTES], tag: &[u8; TAG_BYTES], ciphertext: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_BYTES + ciphertext.len());
    out.extend_from_slice(nonce);
    out.extend_from_slice(tag);
    out.extend_from_slice(ciphertext);
    out
}
