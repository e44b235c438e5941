//! AEAD: AES-256-GCM with a 16-byte nonce, detached tag, no associated data.

use aes_gcm::{
    aead::{consts::U16, AeadInPlace, KeyInit},
    aes::Aes256,
    AesGcm, Nonce, Tag,
};
use getrandom::getrandom;

use crate::error::EnvelopeError;
use crate::wire::{KEY_BYTES, NONCE_BYTES, TAG_BYTES};

/// AES-256-GCM instantiated with 128-bit nonces.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Generate a random 16-byte nonce. Used during sealing only.
pub fn nonce() -> Result<[u8; NONCE_BYTES], EnvelopeError> {
    let mut n = [0u8; NONCE_BYTES];
    getrandom(&mut n).map_err(|_| EnvelopeError::Entropy)?;
    Ok(n)
}

/// AEAD seal. Returns the detached tag and the ciphertext.
pub fn aead_seal(
    key: &[u8; KEY_BYTES],
    nonce: &[u8; NONCE_BYTES],
    plaintext: &[u8],
) -> Result<([u8; TAG_BYTES], Vec<u8>), EnvelopeError> {
    let cipher = Aes256Gcm16::new(key.into());
    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::<U16>::from_slice(nonce), b"", &mut buffer)
        .map_err(|_| EnvelopeError::AuthenticationFailed)?;
    Ok((tag.into(), buffer))
}

/// AEAD open. The tag is checked before the keystream is applied, so a
/// failed open never yields plaintext bytes.
pub fn aead_open(
    key: &[u8; KEY_BYTES],
    nonce: &[u8; NONCE_BYTES],
    tag: &[u8; TAG_BYTES],
    ciphertext: &[u8],
) -> Result<Vec<u8>, EnvelopeError> {
    let cipher = Aes256Gcm16::new(key.into());
    let mut buffer = ciphertext.to_vec();
    cipher
        .decrypt_in_place_detached(
            Nonce::<U16>::from_slice(nonce),
            b"",
            &mut buffer,
            Tag::<U16>::from_slice(tag),
        )
        .map_err(|_| EnvelopeError::AuthenticationFailed)?;
    Ok(buffer)
}
