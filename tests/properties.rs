use proptest::prelude::*;

use custody_envelope::wire::HEADER_BYTES;
use custody_envelope::{derive, open, seal, EnvelopeError, Secret};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn seal_open_roundtrip(secret in prop::collection::vec(any::<u8>(), 1..64),
                           plaintext in prop::collection::vec(any::<u8>(), 0..512)) {
        let key = derive(&Secret::from_bytes(&secret).unwrap()).unwrap();
        let env = seal(&plaintext, &key).unwrap();
        prop_assert_eq!(env.len(), plaintext.len() + HEADER_BYTES);
        prop_assert_eq!(open(&env, &key).unwrap(), plaintext);
    }

    #[test]
    fn any_bit_flip_is_rejected(plaintext in prop::collection::vec(any::<u8>(), 0..128),
                                index in any::<prop::sample::Index>(),
                                bit in 0u8..8) {
        let key = derive(&Secret::generate()).unwrap();
        let mut env = seal(&plaintext, &key).unwrap();
        let i = index.index(env.len());
        env[i] ^= 1 << bit;
        prop_assert_eq!(open(&env, &key), Err(EnvelopeError::AuthenticationFailed));
    }

    #[test]
    fn derivation_is_deterministic(secret in prop::collection::vec(any::<u8>(), 1..64)) {
        let s = Secret::from_bytes(&secret).unwrap();
        prop_assert_eq!(derive(&s).unwrap(), derive(&s).unwrap());
    }

    #[test]
    fn short_inputs_never_panic(data in prop::collection::vec(any::<u8>(), 0..HEADER_BYTES)) {
        let key = derive(&Secret::generate()).unwrap();
        prop_assert_eq!(open(&data, &key), Err(EnvelopeError::EnvelopeTooShort(data.len())));
    }
}
