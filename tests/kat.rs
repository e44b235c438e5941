//! Known answer / fixed-scenario tests.

use custody_envelope::wire::{self, HEADER_BYTES, KEY_BYTES, MIN_ENVELOPE_BYTES, NONCE_BYTES, TAG_BYTES};
use custody_envelope::{
    delegate, derive_hex, inspect, issue_root, open, seal, Command, Constraints, EnvelopeError,
    FixedClock, Keypair, TokenError,
};

const T0: i64 = 1_700_000_000;

#[test]
fn test_wire_constants() {
    assert_eq!(KEY_BYTES, 32);
    assert_eq!(NONCE_BYTES, 16);
    assert_eq!(TAG_BYTES, 16);
    assert_eq!(HEADER_BYTES, 32);
    assert_eq!(MIN_ENVELOPE_BYTES, 32);
}

#[test]
fn test_known_key_derivation() {
    // SHA-256 of the bytes de ad be ef.
    let key = derive_hex("deadbeef").unwrap();
    assert_eq!(
        hex::encode(key.as_bytes()),
        "5f78c33274e43fa9de5659265c1d917e25c03722dcb0b8d27db8d5feaa813953"
    );
}

#[test]
fn test_hello_world_scenario() {
    let key = derive_hex("deadbeef").unwrap();
    assert_eq!(key.as_bytes().len(), 32);

    let env = seal(b"hello world", &key).unwrap();
    assert_eq!(env.len(), 43);

    let parts = wire::decode(&env).unwrap();
    assert_eq!(parts.nonce.len(), 16);
    assert_eq!(parts.tag.len(), 16);
    assert_eq!(parts.ciphertext.len(), 11);

    assert_eq!(open(&env, &key).unwrap(), b"hello world");

    let other = derive_hex("00000000").unwrap();
    assert_eq!(open(&env, &other), Err(EnvelopeError::AuthenticationFailed));

    let info = inspect(&env).unwrap();
    assert_eq!(info.total_bytes, 43);
    assert_eq!(info.plaintext_bytes, 11);
}

#[test]
fn test_delegation_scenario() {
    let clock = FixedClock::new(T0);
    let builder = Keypair::generate();
    let user = Keypair::generate();
    let root = issue_root(&builder, Command::parse("/nil/db/data").unwrap(), 7200, &clock).unwrap();

    let ok = delegate(
        &root,
        Command::parse("/nil/db/data/create").unwrap(),
        &user.did(),
        3600,
        &builder,
        &clock,
        Constraints::new(),
    )
    .unwrap();
    assert_eq!(ok.expires_at(), T0 + 3600);

    let wider = delegate(
        &root,
        Command::parse("/nil/db/other").unwrap(),
        &user.did(),
        3600,
        &builder,
        &clock,
        Constraints::new(),
    );
    assert_eq!(
        wider.unwrap_err(),
        TokenError::CommandNotSubset {
            parent: "/nil/db/data".into(),
            child: "/nil/db/other".into(),
        }
    );

    let longer = delegate(
        &root,
        Command::parse("/nil/db/data/create").unwrap(),
        &user.did(),
        10_000,
        &builder,
        &clock,
        Constraints::new(),
    );
    assert_eq!(
        longer.unwrap_err(),
        TokenError::ExpiryExceedsParent {
            parent: T0 + 7200,
            child: T0 + 10_000,
        }
    );
}
