//! KDF: secret material → AES-256 key
//!
//! key = SHA-256(secret_bytes)
//!
//! The secret is whatever the custody service hands back (hex text of a
//! private key in practice). No salt and no context: the same secret must
//! always open the same envelopes.

use core::fmt;

use rand_core::{OsRng, RngCore};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::KeyDerivationError;
use crate::wire::KEY_BYTES;

/// Size of a freshly generated secret.
pub const SECRET_BYTES: usize = 32;

/// Opaque root material for a symmetric key.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct Secret(Vec<u8>);

impl Secret {
    /// Generate 32 bytes from the OS random source.
    pub fn generate() -> Self {
        let mut bytes = vec![0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyDerivationError> {
        if bytes.is_empty() {
            return Err(KeyDerivationError::MalformedSecret);
        }
        Ok(Self(bytes.to_vec()))
    }

    /// Parse hex text. A leading `0x` is accepted.
    pub fn from_hex(text: &str) -> Result<Self, KeyDerivationError> {
        let text = text.trim();
        let text = text.strip_prefix("0x").unwrap_or(text);
        let bytes = Zeroizing::new(
            hex::decode(text).map_err(|_| KeyDerivationError::MalformedSecret)?,
        );
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(&self.0))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret([REDACTED; {}])", self.0.len())
    }
}

/// 32-byte AES-256 key. Lives only for the duration of one seal or open.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_BYTES]);

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }

    /// Wrap raw key bytes. Fails unless exactly 32 bytes are given.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, KeyDerivationError> {
        let key: [u8; KEY_BYTES] = bytes
            .try_into()
            .map_err(|_| KeyDerivationError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(key))
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey([REDACTED])")
    }
}

/// Derive the envelope key for `secret`.
pub fn derive(secret: &Secret) -> Result<DerivedKey, KeyDerivationError> {
    let mut digest = Sha256::digest(secret.as_bytes());
    let key = DerivedKey::from_slice(digest.as_slice());
    digest.as_mut_slice().zeroize();
    key
}

/// Parse hex secret text and derive its key in one step.
pub fn derive_hex(text: &str) -> Result<DerivedKey, KeyDerivationError> {
    derive(&Secret::from_hex(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_is_deterministic() {
        let s = Secret::from_hex("deadbeef").unwrap();
        assert_eq!(derive(&s).unwrap(), derive(&s).unwrap());
    }

    #[test]
    fn derive_matches_plain_sha256() {
        let s = Secret::from_hex("deadbeef").unwrap();
        let expected = Sha256::digest([0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(derive(&s).unwrap().as_bytes().as_slice(), expected.as_slice());
    }

    #[test]
    fn different_secrets_give_different_keys() {
        let a = derive_hex("deadbeef").unwrap();
        let b = derive_hex("00000000").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn hex_prefix_and_whitespace_accepted() {
        assert_eq!(derive_hex("0xdeadbeef\n").unwrap(), derive_hex("deadbeef").unwrap());
    }

    #[test]
    fn malformed_secret_rejected() {
        assert_eq!(Secret::from_hex("zz").unwrap_err(), KeyDerivationError::MalformedSecret);
        assert_eq!(Secret::from_hex("abc").unwrap_err(), KeyDerivationError::MalformedSecret);
        assert_eq!(Secret::from_hex("").unwrap_err(), KeyDerivationError::MalformedSecret);
    }

    #[test]
    fn key_length_guard() {
        assert_eq!(
            DerivedKey::from_slice(&[0u8; 16]).unwrap_err(),
            KeyDerivationError::InvalidKeyLength(16)
        );
    }

    #[test]
    fn debug_output_is_redacted() {
        let s = Secret::from_hex("deadbeef").unwrap();
        assert!(!format!("{:?}", s).contains("dead"));
        assert_eq!(format!("{:?}", derive(&s).unwrap()), "DerivedKey([REDACTED])");
    }

    #[test]
    fn generated_secret_has_expected_length() {
        let s = Secret::generate();
        assert_eq!(s.len(), SECRET_BYTES);
        assert_ne!(s, Secret::generate());
    }
}
