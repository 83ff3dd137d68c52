//! Binding nonce tying a proof to one ephemeral key generation.
//!
//! `nonce = Poseidon(H_pk(pubkey), H_salt(salt), expiry)` over BN254, where
//! `H_*` are tagged SHA-256 maps into the field. The membership circuit
//! recomputes the same value, so a proof made for one key never verifies
//! for a rotated one.

use ark_bn254::Fr;
use ark_ff::{BigInteger, PrimeField};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::crypto::{digest_to_field, EphemeralPublicKey, PoseidonHasher};
use crate::error::{Error, Result};

/// Width of the nonce in bytes (one BN254 scalar, big-endian).
pub const NONCE_LEN: usize = 32;

const PUBKEY_TAG: &[u8] = b"nymph/nonce/pubkey";
const SALT_TAG: &[u8] = b"nymph/nonce/salt";

/// A canonical BN254 scalar encoded big-endian.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindingNonce([u8; NONCE_LEN]);

impl BindingNonce {
    pub fn from_field(f: Fr) -> Self {
        let mut out = [0u8; NONCE_LEN];
        out.copy_from_slice(&f.into_bigint().to_bytes_be());
        Self(out)
    }

    pub fn to_field(&self) -> Fr {
        Fr::from_be_bytes_mod_order(&self.0)
    }

    pub fn as_bytes(&self) -> &[u8; NONCE_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::Encoding(format!("nonce: {}", e)))?;
        let arr: [u8; NONCE_LEN] = bytes
            .try_into()
            .map_err(|_| Error::Encoding("nonce must be 32 bytes".into()))?;
        // Reject encodings that are not reduced field elements.
        let nonce = Self(arr);
        if Self::from_field(nonce.to_field()) != nonce {
            return Err(Error::Encoding("nonce is not a canonical field element".into()));
        }
        Ok(nonce)
    }

    /// Decimal form, as circuits that take the nonce as a string expect.
    pub fn to_decimal(&self) -> String {
        self.to_field().into_bigint().to_string()
    }
}

impl std::fmt::Debug for BindingNonce {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "BindingNonce({})", self.to_hex())
    }
}

impl Serialize for BindingNonce {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BindingNonce {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Derives binding nonces.
#[derive(Clone, Default)]
pub struct NonceBinder {
    hasher: PoseidonHasher,
}

impl NonceBinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(&self, pubkey: &EphemeralPublicKey, salt: &[u8; 32], expiry: u64) -> BindingNonce {
        BindingNonce::from_field(self.bind_fields(
            Self::pubkey_field(pubkey),
            Self::salt_field(salt),
            Self::expiry_field(expiry),
        ))
    }

    /// The nonce over already-mapped field inputs.
    pub fn bind_fields(&self, pubkey: Fr, salt: Fr, expiry: Fr) -> Fr {
        self.hasher.hash_many(&[pubkey, salt, expiry])
    }

    pub fn pubkey_field(pubkey: &EphemeralPublicKey) -> Fr {
        digest_to_field(PUBKEY_TAG, pubkey.as_bytes())
    }

    pub fn salt_field(salt: &[u8; 32]) -> Fr {
        digest_to_field(SALT_TAG, salt)
    }

    pub fn expiry_field(expiry: u64) -> Fr {
        Fr::from(expiry)
    }

    pub fn hasher(&self) -> &PoseidonHasher {
        &self.hasher
    }
}
