use custody_envelope::wire::{HEADER_BYTES, MIN_ENVELOPE_BYTES, NONCE_BYTES, TAG_BYTES};
use custody_envelope::{derive, derive_hex, open, seal, DerivedKey, EnvelopeError, Secret};

fn setup() -> DerivedKey {
    derive(&Secret::generate()).unwrap()
}

#[test]
fn roundtrip_basic() {
    let key = setup();
    let plaintext = b"hello custody world";

    let env = seal(plaintext, &key).unwrap();
    let pt = open(&env, &key).unwrap();
    assert_eq!(&pt, plaintext);
}

#[test]
fn roundtrip_empty_plaintext() {
    let key = setup();
    let env = seal(b"", &key).unwrap();
    assert_eq!(env.len(), MIN_ENVELOPE_BYTES);
    assert_eq!(open(&env, &key).unwrap(), b"");
}

#[test]
fn roundtrip_large_plaintext() {
    let key = setup();
    let plaintext = vec![0xABu8; 65536];
    let env = seal(&plaintext, &key).unwrap();
    assert_eq!(env.len(), plaintext.len() + HEADER_BYTES);
    assert_eq!(open(&env, &key).unwrap(), plaintext);
}

#[test]
fn same_secret_reopens() {
    let secret = Secret::from_hex("0123456789abcdef").unwrap();
    let env = seal(b"data", &derive(&secret).unwrap()).unwrap();
    let again = derive_hex("0123456789abcdef").unwrap();
    assert_eq!(open(&env, &again).unwrap(), b"data");
}

#[test]
fn wrong_key_fails() {
    let env = seal(b"data", &setup()).unwrap();
    assert_eq!(open(&env, &setup()), Err(EnvelopeError::AuthenticationFailed));
}

#[test]
fn tamper_nonce_fails() {
    let key = setup();
    let mut env = seal(b"data", &key).unwrap();
    env[0] ^= 0x01;
    assert_eq!(open(&env, &key), Err(EnvelopeError::AuthenticationFailed));
}

#[test]
fn tamper_tag_fails() {
    let key = setup();
    let mut env = seal(b"data", &key).unwrap();
    env[NONCE_BYTES + TAG_BYTES - 1] ^= 0x80;
    assert_eq!(open(&env, &key), Err(EnvelopeError::AuthenticationFailed));
}

#[test]
fn tamper_ciphertext_fails() {
    let key = setup();
    let mut env = seal(b"data", &key).unwrap();
    let last = env.len() - 1;
    env[last] ^= 0x01;
    assert_eq!(open(&env, &key), Err(EnvelopeError::AuthenticationFailed));
}

#[test]
fn appended_byte_fails() {
    let key = setup();
    let mut env = seal(b"data", &key).unwrap();
    env.push(0);
    assert_eq!(open(&env, &key), Err(EnvelopeError::AuthenticationFailed));
}

#[test]
fn truncated_fails() {
    let key = setup();
    let env = seal(b"data", &key).unwrap();
    assert_eq!(open(&env[..10], &key), Err(EnvelopeError::EnvelopeTooShort(10)));
    assert_eq!(open(b"short", &key), Err(EnvelopeError::EnvelopeTooShort(5)));
    assert_eq!(open(b"", &key), Err(EnvelopeError::EnvelopeTooShort(0)));
    // Dropping ciphertext bytes keeps the header, so the tag check catches it.
    assert_eq!(
        open(&env[..env.len() - 1], &key),
        Err(EnvelopeError::AuthenticationFailed)
    );
}

#[test]
fn error_messages_carry_no_key_material() {
    let secret_hex = "deadbeefcafebabe";
    let key = derive_hex(secret_hex).unwrap();
    let env = seal(b"data", &key).unwrap();
    let err = open(&env, &derive_hex("00").unwrap()).unwrap_err();
    let msg = err.to_string();
    assert_eq!(msg, "envelope authentication failed");
    assert!(!msg.contains(secret_hex));
}
