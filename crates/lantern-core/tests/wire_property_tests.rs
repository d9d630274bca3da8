//! Property Tests for the Wire Codec and Crypto Layer
//!
//! Exercises the universal properties every valid input must satisfy:
//! codec round-trips in both directions, deterministic and big-endian
//! encoding, AEAD round-trips with key separation, and commutative key
//! agreement.

use proptest::prelude::*;

use lantern_core::crypto::{self, Identity};
use lantern_core::envelope::{MessageEnvelope, PROTOCOL_VERSION};
use lantern_core::types::{MessageId, SenderId, Timestamp, Ttl};
use lantern_core::wire;

// ----------------------------------------------------------------------------
// Strategies
// ----------------------------------------------------------------------------

fn arb_envelope() -> impl Strategy<Value = MessageEnvelope> {
    (
        any::<[u8; 16]>(),
        any::<[u8; 8]>(),
        any::<[u8; 8]>(),
        any::<u64>(),
        any::<u8>(),
        proptest::collection::vec(any::<u8>(), 0..64),
        proptest::collection::vec(any::<u8>(), 0..64),
        proptest::collection::vec(any::<u8>(), 0..512),
    )
        .prop_map(
            |(message_id, sender_id, recipient_id, timestamp, ttl, nonce, tag, ciphertext)| {
                MessageEnvelope {
                    version: PROTOCOL_VERSION,
                    message_id: MessageId::from_bytes(message_id),
                    sender_id: SenderId::new(sender_id),
                    recipient_id: SenderId::new(recipient_id),
                    timestamp: Timestamp::new(timestamp),
                    ttl: Ttl::new(ttl),
                    nonce,
                    tag,
                    ciphertext,
                }
            },
        )
}

// ----------------------------------------------------------------------------
// Codec Properties
// ----------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_decode_inverts_encode(envelope in arb_envelope()) {
        let bytes = wire::encode(&envelope).unwrap();
        prop_assert_eq!(wire::decode(&bytes).unwrap(), envelope);
    }

    #[test]
    fn prop_encode_inverts_decode(envelope in arb_envelope()) {
        let bytes = wire::encode(&envelope).unwrap();
        let decoded = wire::decode(&bytes).unwrap();
        prop_assert_eq!(wire::encode(&decoded).unwrap(), bytes);
    }

    #[test]
    fn prop_encoding_is_deterministic(envelope in arb_envelope()) {
        prop_assert_eq!(
            wire::encode(&envelope).unwrap(),
            wire::encode(&envelope.clone()).unwrap()
        );
    }

    #[test]
    fn prop_encoded_len_is_exact(envelope in arb_envelope()) {
        let bytes = wire::encode(&envelope).unwrap();
        prop_assert_eq!(bytes.len(), envelope.encoded_len());
    }

    #[test]
    fn prop_trailing_bytes_rejected(envelope in arb_envelope(), extra in 1usize..8) {
        let mut bytes = wire::encode(&envelope).unwrap();
        bytes.extend(std::iter::repeat(0u8).take(extra));
        // field lengths are declared in-band, so appended bytes always
        // surface as trailing data
        prop_assert!(wire::decode(&bytes).is_err());
    }

    #[test]
    fn prop_timestamp_field_is_big_endian(envelope in arb_envelope()) {
        let bytes = wire::encode(&envelope).unwrap();
        let at = 1 + 16 + 8 + 8;
        let field: [u8; 8] = bytes[at..at + 8].try_into().unwrap();
        prop_assert_eq!(u64::from_be_bytes(field), envelope.timestamp.as_millis());
    }

    #[test]
    fn prop_truncation_never_panics(envelope in arb_envelope(), cut in 0usize..64) {
        let bytes = wire::encode(&envelope).unwrap();
        let keep = bytes.len().saturating_sub(cut);
        // any prefix must decode cleanly or fail cleanly
        let _ = wire::decode(&bytes[..keep]);
    }

    #[test]
    fn prop_arbitrary_bytes_never_panic(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let _ = wire::decode(&bytes);
    }
}

// ----------------------------------------------------------------------------
// Crypto Properties
// ----------------------------------------------------------------------------

proptest! {
    #[test]
    fn prop_decrypt_inverts_encrypt(
        plaintext in proptest::collection::vec(any::<u8>(), 0..256),
        key in any::<[u8; 32]>(),
    ) {
        let sealed = crypto::encrypt(&plaintext, &key).unwrap();
        let opened = crypto::decrypt(&sealed.ciphertext, &sealed.nonce, &sealed.tag, &key).unwrap();
        prop_assert_eq!(opened, plaintext);
    }

    #[test]
    fn prop_wrong_key_never_decrypts(
        plaintext in proptest::collection::vec(any::<u8>(), 0..256),
        key1 in any::<[u8; 32]>(),
        key2 in any::<[u8; 32]>(),
    ) {
        prop_assume!(key1 != key2);
        let sealed = crypto::encrypt(&plaintext, &key1).unwrap();
        prop_assert!(
            crypto::decrypt(&sealed.ciphertext, &sealed.nonce, &sealed.tag, &key2).is_err()
        );
    }

    #[test]
    fn prop_key_agreement_commutes(
        private_a in any::<[u8; 32]>(),
        private_b in any::<[u8; 32]>(),
    ) {
        let a = Identity::from_private_bytes(private_a);
        let b = Identity::from_private_bytes(private_b);
        prop_assert_eq!(
            a.agree(&b.public_key_bytes()),
            b.agree(&a.public_key_bytes())
        );
    }

    #[test]
    fn prop_fingerprint_verifies_own_key(private in any::<[u8; 32]>()) {
        let identity = Identity::from_private_bytes(private);
        let public = identity.public_key_bytes();
        prop_assert!(crypto::verify_fingerprint(&crypto::fingerprint(&public), &public));
    }
}
