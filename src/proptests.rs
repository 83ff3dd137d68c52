//! Property-based tests for the key, nonce and encoding invariants.
//!
//! - Binding nonces are deterministic and change with every input
//! - Ephemeral signatures verify only for the signed bytes
//! - Domain encodings are fixed-width and reject overflow
//! - Limb encodings are lossless

use proptest::prelude::*;
use rsa::BigUint;

use crate::jwt::signing::{to_limbs, LIMB_BITS, LIMB_COUNT};
use crate::jwt::{normalize_domain, to_fixed_width_bytes, MAX_DOMAIN_LEN};
use crate::keys::EphemeralKey;
use crate::message::Message;
use crate::nonce::{BindingNonce, NonceBinder};

// ==================== Binding Nonce ====================

proptest! {
    #[test]
    fn nonce_is_deterministic(secret: [u8; 32], salt: [u8; 32], expiry: u64) {
        let key = EphemeralKey::from_secret(secret, salt, expiry);
        let binder = NonceBinder::new();
        let again = binder.bind(key.public_key(), &salt, expiry);
        prop_assert_eq!(key.binding_hash(), &again);

        let parsed = BindingNonce::from_hex(&again.to_hex()).unwrap();
        prop_assert_eq!(parsed, again);
    }

    #[test]
    fn nonce_changes_with_expiry(secret: [u8; 32], salt: [u8; 32], a: u64, b: u64) {
        prop_assume!(a != b);
        let ka = EphemeralKey::from_secret(secret, salt, a);
        let kb = EphemeralKey::from_secret(secret, salt, b);
        prop_assert_ne!(ka.binding_hash(), kb.binding_hash());
    }

    #[test]
    fn nonce_changes_with_salt(secret: [u8; 32], salt: [u8; 32], index in 0usize..32, bit in 0u8..8) {
        let mut other = salt;
        other[index] ^= 1 << bit;
        let ka = EphemeralKey::from_secret(secret, salt, 1_700_000_000);
        let kb = EphemeralKey::from_secret(secret, other, 1_700_000_000);
        prop_assert_ne!(ka.binding_hash(), kb.binding_hash());
    }

    #[test]
    fn nonce_changes_with_key(a: [u8; 32], b: [u8; 32], salt: [u8; 32]) {
        prop_assume!(a != b);
        let ka = EphemeralKey::from_secret(a, salt, 42);
        let kb = EphemeralKey::from_secret(b, salt, 42);
        prop_assert_ne!(ka.binding_hash(), kb.binding_hash());
    }
}

// ==================== Ephemeral Signatures ====================

proptest! {
    #[test]
    fn signature_verifies_signed_bytes(
        secret: [u8; 32],
        message in prop::collection::vec(any::<u8>(), 1..256)
    ) {
        let key = EphemeralKey::from_secret(secret, [0u8; 32], 1);
        let signature = key.sign(&message);
        prop_assert!(key.public_key().verify(&message, &signature));
    }

    #[test]
    fn signature_rejects_modified_bytes(
        secret: [u8; 32],
        message in prop::collection::vec(any::<u8>(), 1..256),
        index in any::<prop::sample::Index>()
    ) {
        let key = EphemeralKey::from_secret(secret, [0u8; 32], 1);
        let signature = key.sign(&message);

        let mut tampered = message.clone();
        let i = index.index(tampered.len());
        tampered[i] ^= 0x01;
        prop_assert!(!key.public_key().verify(&tampered, &signature));
    }

    #[test]
    fn likes_do_not_affect_signed_body(text in ".{0,200}", likes: u64) {
        let message = Message {
            id: "id".into(),
            anon_group_id: "acme.com".into(),
            anon_group_provider: "google".into(),
            text,
            timestamp: 1_700_000_000,
            internal: false,
            likes: 0,
        };
        let liked = Message { likes, ..message.clone() };
        prop_assert_eq!(message.canonical_bytes().unwrap(), liked.canonical_bytes().unwrap());
    }
}

// ==================== Domain Encoding ====================

proptest! {
    #[test]
    fn fixed_width_domain_is_padded(domain in "[a-z0-9.-]{1,64}") {
        let bytes = to_fixed_width_bytes(&domain, MAX_DOMAIN_LEN).unwrap();
        prop_assert_eq!(bytes.len(), MAX_DOMAIN_LEN);
        prop_assert_eq!(&bytes[..domain.len()], domain.as_bytes());
        prop_assert!(bytes[domain.len()..].iter().all(|b| *b == 0));
    }

    #[test]
    fn oversized_domain_rejected(extra in 1usize..64) {
        let domain = "a".repeat(MAX_DOMAIN_LEN + extra);
        prop_assert!(to_fixed_width_bytes(&domain, MAX_DOMAIN_LEN).is_err());
        prop_assert!(normalize_domain(&domain).is_err());
    }

    #[test]
    fn normalization_is_idempotent(domain in "[A-Za-z0-9][A-Za-z0-9-]{0,20}\\.[A-Za-z]{2,6}") {
        let once = normalize_domain(&domain).unwrap();
        prop_assert_eq!(&once, &domain.to_lowercase());
        prop_assert_eq!(normalize_domain(&once).unwrap(), once);
    }
}

// ==================== Limb Encoding ====================

proptest! {
    #[test]
    fn limbs_recompose(bytes in prop::collection::vec(any::<u8>(), 0..=270)) {
        let value = BigUint::from_bytes_be(&bytes);
        let limbs = to_limbs(&value, "value").unwrap();
        prop_assert!(limbs.iter().all(|l| *l < (1u128 << LIMB_BITS)));

        let mut recomposed = BigUint::from(0u8);
        for limb in limbs.iter().rev() {
            recomposed = (recomposed << LIMB_BITS) + BigUint::from(*limb);
        }
        prop_assert_eq!(recomposed, value);
    }

    #[test]
    fn limbs_reject_overflow(extra in prop::collection::vec(1u8..=255, 1..8)) {
        let mut bytes = extra;
        bytes.extend(std::iter::repeat(0xff).take(LIMB_COUNT * LIMB_BITS / 8));
        let value = BigUint::from_bytes_be(&bytes);
        prop_assert!(to_limbs(&value, "value").is_err());
    }
}
