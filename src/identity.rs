//! Ed25519 identities and their DID text form.
//!
//! DID format: `did:nil:<hex(public key)>`

use core::fmt;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::TokenError;
use crate::kdf::Secret;

/// DID method prefix.
pub const DID_PREFIX: &str = "did:nil:";

pub const PUBLIC_KEY_BYTES: usize = 32;
pub const PRIVATE_KEY_BYTES: usize = 32;
pub const SIGNATURE_BYTES: usize = 64;

/// Signing identity. The private half never leaves this type except through
/// [`Keypair::to_hex`].
pub struct Keypair {
    signing_key: SigningKey,
}

impl Keypair {
    pub fn generate() -> Self {
        let mut seed = Zeroizing::new([0u8; PRIVATE_KEY_BYTES]);
        OsRng.fill_bytes(&mut *seed);
        Self {
            signing_key: SigningKey::from_bytes(&seed),
        }
    }

    /// Build from exactly 32 private key bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, TokenError> {
        let seed: Zeroizing<[u8; PRIVATE_KEY_BYTES]> =
            Zeroizing::new(bytes.try_into().map_err(|_| {
                TokenError::InvalidIdentity(format!(
                    "private key must be {} bytes, got {}",
                    PRIVATE_KEY_BYTES,
                    bytes.len()
                ))
            })?);
        Ok(Self {
            signing_key: SigningKey::from_bytes(&seed),
        })
    }

    /// The user identity of a custody session is the secret itself used as a
    /// private key, so whoever can read the share back can also act as that
    /// user.
    pub fn from_secret(secret: &Secret) -> Result<Self, TokenError> {
        Self::from_bytes(secret.as_bytes())
    }

    pub fn from_hex(text: &str) -> Result<Self, TokenError> {
        Self::from_secret(&Secret::from_hex(text)?)
    }

    pub fn to_hex(&self) -> Zeroizing<String> {
        Zeroizing::new(hex::encode(self.signing_key.to_bytes()))
    }

    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_BYTES] {
        self.signing_key.verifying_key().to_bytes()
    }

    pub fn did(&self) -> Did {
        Did::from_verifying_key(&self.signing_key.verifying_key())
    }

    pub fn sign(&self, message: &[u8]) -> [u8; SIGNATURE_BYTES] {
        self.signing_key.sign(message).to_bytes()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair").field("did", &self.did()).finish()
    }
}

/// Decentralised identifier derived from an Ed25519 public key.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Did(String);

impl Did {
    pub fn parse(text: &str) -> Result<Self, TokenError> {
        let did = Self(text.to_string());
        did.verifying_key()?;
        Ok(did)
    }

    fn from_verifying_key(key: &VerifyingKey) -> Self {
        Self(format!("{}{}", DID_PREFIX, hex::encode(key.to_bytes())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn verifying_key(&self) -> Result<VerifyingKey, TokenError> {
        let invalid = || TokenError::InvalidIdentity(self.0.clone());
        let key_hex = self.0.strip_prefix(DID_PREFIX).ok_or_else(invalid)?;
        let bytes = hex::decode(key_hex).map_err(|_| invalid())?;
        let bytes: [u8; PUBLIC_KEY_BYTES] = bytes.as_slice().try_into().map_err(|_| invalid())?;
        VerifyingKey::from_bytes(&bytes).map_err(|_| invalid())
    }

    /// Check `signature` over `message` against this DID's public key.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<(), TokenError> {
        let key = self.verifying_key()?;
        let sig: [u8; SIGNATURE_BYTES] = signature
            .try_into()
            .map_err(|_| TokenError::ChainInvalid(format!("bad signature length {}", signature.len())))?;
        key.verify(message, &Signature::from_bytes(&sig))
            .map_err(|_| TokenError::ChainInvalid(format!("signature by {} does not verify", self.0)))
    }
}

impl TryFrom<String> for Did {
    type Error = TokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Did> for String {
    fn from(did: Did) -> Self {
        did.0
    }
}

impl fmt::Display for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for Did {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Did({})", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn did_roundtrips_through_text() {
        let kp = Keypair::generate();
        let did = kp.did();
        assert!(did.as_str().starts_with(DID_PREFIX));
        assert_eq!(Did::parse(did.as_str()).unwrap(), did);
    }

    #[test]
    fn keypair_hex_is_stable() {
        let kp = Keypair::generate();
        let again = Keypair::from_hex(&kp.to_hex()).unwrap();
        assert_eq!(kp.did(), again.did());
    }

    #[test]
    fn signature_verifies_only_for_signer() {
        let a = Keypair::generate();
        let b = Keypair::generate();
        let sig = a.sign(b"payload");
        assert!(a.did().verify(b"payload", &sig).is_ok());
        assert!(a.did().verify(b"payloaD", &sig).is_err());
        assert!(b.did().verify(b"payload", &sig).is_err());
    }

    #[test]
    fn malformed_dids_rejected() {
        assert!(Did::parse("did:key:abcd").is_err());
        assert!(Did::parse("did:nil:zz").is_err());
        assert!(Did::parse("did:nil:abcd").is_err());
    }

    #[test]
    fn short_private_key_rejected() {
        assert!(matches!(
            Keypair::from_bytes(&[1u8; 16]),
            Err(TokenError::InvalidIdentity(_))
        ));
        assert!(matches!(
            Keypair::from_hex("nothex"),
            Err(TokenError::InvalidIdentity(_))
        ));
    }

    #[test]
    fn debug_hides_private_key() {
        let kp = Keypair::from_bytes(&[7u8; 32]).unwrap();
        let dbg = format!("{:?}", kp);
        assert!(!dbg.contains(kp.to_hex().as_str()));
        assert!(dbg.contains(DID_PREFIX));
    }
}
