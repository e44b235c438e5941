//! # Custody Envelope
//!
//! Authenticated content envelopes and the capability tokens that gate who may
//! fetch their keys.
//!
//! ## Quick Start
//!
//! ```rust
//! use custody_envelope::{derive, open, seal, Secret};
//!
//! let secret = Secret::generate();
//! let key = derive(&secret).unwrap();
//!
//! let envelope = seal(b"secret", &key).unwrap();
//! assert_eq!(envelope.len(), 6 + 32);
//! assert_eq!(open(&envelope, &key).unwrap(), b"secret");
//! ```
//!
//! ## Properties
//!
//! - **Deterministic key**: `key = SHA-256(secret)`, no salt
//! - **Fixed layout**: `nonce[16] || tag[16] || ciphertext`
//! - **Fail closed**: no plaintext before the tag verifies
//! - **Narrowing chains**: every delegation shrinks command, expiry and constraints
//!
//! ## What's NOT Provided
//!
//! - Multi-recipient encryption
//! - Key rotation
//! - Token revocation

#![deny(unsafe_code)]

mod aead;
mod clock;
mod command;
mod envelope;
mod error;
mod identity;
mod kdf;
mod token;

#[doc(hidden)]
pub mod wire;

pub use clock::{Clock, FixedClock, SystemClock};
pub use command::Command;
pub use envelope::{inspect, open, seal, EnvelopeInfo};
pub use error::{EnvelopeError, KeyDerivationError, TokenError};
pub use identity::{Did, Keypair, DID_PREFIX};
pub use kdf::{derive, derive_hex, DerivedKey, Secret, SECRET_BYTES};
pub use token::{
    delegate, invoke, issue_root, verify, Constraints, Token, TokenBody, TokenBuilder,
    TokenPayload, VerifiedChain, MAX_CHAIN_DEPTH,
};
pub use wire::{HEADER_BYTES, MIN_ENVELOPE_BYTES};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
