//! Fixed-schema input record for the JWT membership circuit.
//!
//! All variable-length data is placed into fixed-width, zero-padded arrays
//! by [`CircuitInputBuilder`]. Anything that would not fit is rejected with
//! [`Error::CircuitInputOverflow`] rather than truncated.

use sha2::digest::consts::U64;
use sha2::digest::generic_array::GenericArray;
use sha2::compress256;

use crate::backend::PublicStatement;
use crate::crypto::EphemeralPublicKey;
use crate::error::{Error, Result};
use crate::jwt::signing::{signature_limbs, Limbs, LIMB_COUNT};
use crate::jwt::{normalize_domain, to_fixed_width_bytes, IdentityToken, JwtSigningKey, MAX_DOMAIN_LEN};
use crate::keys::EphemeralKey;
use crate::nonce::BindingNonce;

/// Capacity for the un-hashed remainder of `header.payload`.
pub const MAX_PARTIAL_DATA_LEN: usize = 640;

const BLOCK_LEN: usize = 64;

const SHA256_IV: [u32; 8] = [
    0x6a09e667, 0xbb67ae85, 0x3c6ef372, 0xa54ff53a, 0x510e527f, 0x9b05688c, 0x1f83d9ab, 0x5be0cd19,
];

#[derive(Clone, PartialEq, Eq)]
pub struct CircuitInput {
    /// `header.payload` after the pre-hashed blocks, zero-padded.
    pub partial_data: [u8; MAX_PARTIAL_DATA_LEN],
    pub partial_data_len: usize,
    /// SHA-256 state after the whole header blocks.
    pub partial_hash: [u32; 8],
    /// Length of the full `header.payload` in bytes.
    pub full_data_length: usize,
    /// Offset of the payload segment inside `partial_data`.
    pub base64_decode_offset: usize,
    pub jwt_pubkey_modulus_limbs: Limbs,
    pub jwt_pubkey_redc_params_limbs: Limbs,
    pub jwt_signature_limbs: Limbs,
    pub domain: [u8; MAX_DOMAIN_LEN],
    pub domain_len: usize,
    pub ephemeral_pubkey: EphemeralPublicKey,
    pub ephemeral_pubkey_salt: [u8; 32],
    pub ephemeral_pubkey_expiry: u64,
    pub nonce: BindingNonce,
}

impl CircuitInput {
    pub fn domain_str(&self) -> Result<&str> {
        std::str::from_utf8(&self.domain[..self.domain_len])
            .map_err(|_| Error::InvalidDomain("domain bytes are not UTF-8".to_string()))
    }

    /// The statement a verifier will check this input's proof against.
    pub fn statement(&self) -> Result<PublicStatement> {
        Ok(PublicStatement {
            domain: self.domain_str()?.to_string(),
            ephemeral_pubkey: self.ephemeral_pubkey,
            expiry: self.ephemeral_pubkey_expiry,
        })
    }

    /// SHA-256 of the full `header.payload`, finished from the midstate.
    pub fn signed_data_digest(&self) -> [u8; 32] {
        let consumed = self.full_data_length - self.partial_data_len;
        let mut tail = self.partial_data[..self.partial_data_len].to_vec();
        tail.push(0x80);
        while (consumed + tail.len()) % BLOCK_LEN != BLOCK_LEN - 8 {
            tail.push(0);
        }
        tail.extend_from_slice(&((self.full_data_length as u64) * 8).to_be_bytes());

        let mut state = self.partial_hash;
        let blocks: Vec<GenericArray<u8, U64>> =
            tail.chunks(BLOCK_LEN).map(GenericArray::clone_from_slice).collect();
        compress256(&mut state, &blocks);

        let mut out = [0u8; 32];
        for (chunk, word) in out.chunks_mut(4).zip(state) {
            chunk.copy_from_slice(&word.to_be_bytes());
        }
        out
    }
}

impl std::fmt::Debug for CircuitInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitInput")
            .field("domain", &self.domain_str().unwrap_or("<invalid>"))
            .field("full_data_length", &self.full_data_length)
            .field("partial_data_len", &self.partial_data_len)
            .field("ephemeral_pubkey", &self.ephemeral_pubkey)
            .field("nonce", &self.nonce)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`CircuitInput`] from a token, domain and ephemeral key.
pub struct CircuitInputBuilder<'a> {
    token: &'a IdentityToken,
    domain: &'a str,
    key: Option<&'a EphemeralKey>,
    signing_key: Option<&'a JwtSigningKey>,
}

impl<'a> CircuitInputBuilder<'a> {
    pub fn new(token: &'a IdentityToken, domain: &'a str) -> Self {
        Self {
            token,
            domain,
            key: None,
            signing_key: None,
        }
    }

    pub fn ephemeral_key(mut self, key: &'a EphemeralKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Issuer key for the RSA limbs. Without one the limbs stay zero.
    pub fn signing_key(mut self, key: Option<&'a JwtSigningKey>) -> Self {
        self.signing_key = key;
        self
    }

    pub fn build(self) -> Result<CircuitInput> {
        let key = self.key.ok_or(Error::NoKey)?;

        let domain = normalize_domain(self.domain)?;
        let mut domain_bytes = [0u8; MAX_DOMAIN_LEN];
        domain_bytes.copy_from_slice(&to_fixed_width_bytes(&domain, MAX_DOMAIN_LEN)?);

        let signed = self.token.signed_part().as_bytes();
        let header_len = self.token.header_len();
        let hashed_blocks = header_len / BLOCK_LEN;
        let precomputed = hashed_blocks * BLOCK_LEN;

        let remainder = &signed[precomputed..];
        if remainder.len() > MAX_PARTIAL_DATA_LEN {
            return Err(Error::CircuitInputOverflow {
                field: "partial_data",
                len: remainder.len(),
                max: MAX_PARTIAL_DATA_LEN,
            });
        }

        let mut partial_hash = SHA256_IV;
        let blocks: Vec<GenericArray<u8, U64>> = signed[..precomputed]
            .chunks(BLOCK_LEN)
            .map(GenericArray::clone_from_slice)
            .collect();
        compress256(&mut partial_hash, &blocks);

        let mut partial_data = [0u8; MAX_PARTIAL_DATA_LEN];
        partial_data[..remainder.len()].copy_from_slice(remainder);

        let (modulus, redc) = match self.signing_key {
            Some(k) => (k.modulus_limbs()?, k.redc_limbs()?),
            None => ([0u128; LIMB_COUNT], [0u128; LIMB_COUNT]),
        };
        let signature = match self.signing_key {
            Some(_) => signature_limbs(self.token)?,
            None => [0u128; LIMB_COUNT],
        };

        Ok(CircuitInput {
            partial_data,
            partial_data_len: remainder.len(),
            partial_hash,
            full_data_length: signed.len(),
            base64_decode_offset: header_len + 1 - precomputed,
            jwt_pubkey_modulus_limbs: modulus,
            jwt_pubkey_redc_params_limbs: redc,
            jwt_signature_limbs: signature,
            domain: domain_bytes,
            domain_len: domain.len(),
            ephemeral_pubkey: *key.public_key(),
            ephemeral_pubkey_salt: *key.salt(),
            ephemeral_pubkey_expiry: key.expiry(),
            nonce: *key.binding_hash(),
        })
    }
}
