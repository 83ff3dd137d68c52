//! Poseidon hash over the BN254 scalar field.
//!
//! The same configuration is used natively (nonce binding) and inside the
//! membership circuit, so both sides compute identical values.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    poseidon::{PoseidonConfig, PoseidonSponge},
    CryptographicSponge,
};
use ark_ff::{Field, PrimeField};
use ark_std::vec::Vec;
use sha2::{Digest, Sha256};

const FULL_ROUNDS: usize = 8;
const PARTIAL_ROUNDS: usize = 57;
const ALPHA: u64 = 5;
const RATE: usize = 2;
const CAPACITY: usize = 1;

/// Domain tag for round-constant derivation.
const ARK_TAG: &[u8] = b"nymph/poseidon/bn254/ark/v1";

/// Poseidon hasher configured for BN254 scalar field.
#[derive(Clone)]
pub struct PoseidonHasher {
    config: PoseidonConfig<Fr>,
}

impl PoseidonHasher {
    pub fn new() -> Self {
        Self {
            config: Self::default_config(),
        }
    }

    fn default_config() -> PoseidonConfig<Fr> {
        let (ark, mds) = Self::generate_parameters(RATE + CAPACITY, FULL_ROUNDS + PARTIAL_ROUNDS);

        PoseidonConfig {
            full_rounds: FULL_ROUNDS,
            partial_rounds: PARTIAL_ROUNDS,
            alpha: ALPHA,
            ark,
            mds,
            rate: RATE,
            capacity: CAPACITY,
        }
    }

    /// Round constants are SHA-256 in counter mode under [`ARK_TAG`];
    /// the MDS matrix is the Cauchy matrix `1 / (x_i + y_j)`.
    fn generate_parameters(width: usize, total_rounds: usize) -> (Vec<Vec<Fr>>, Vec<Vec<Fr>>) {
        let mut ark = Vec::with_capacity(total_rounds);
        for r in 0..total_rounds {
            let mut round_constants = Vec::with_capacity(width);
            for i in 0..width {
                let mut hasher = Sha256::new();
                hasher.update(ARK_TAG);
                hasher.update((r as u32).to_be_bytes());
                hasher.update((i as u32).to_be_bytes());
                round_constants.push(Fr::from_be_bytes_mod_order(&hasher.finalize()));
            }
            ark.push(round_constants);
        }

        let mut mds = Vec::with_capacity(width);
        for i in 0..width {
            let mut row = Vec::with_capacity(width);
            for j in 0..width {
                let x = Fr::from((i + 1) as u64);
                let y = Fr::from((width + j + 1) as u64);
                row.push((x + y).inverse().unwrap_or(Fr::from(1u64)));
            }
            mds.push(row);
        }

        (ark, mds)
    }

    /// Hash field elements into one, absorbing in order.
    pub fn hash_many(&self, elements: &[Fr]) -> Fr {
        let mut sponge = PoseidonSponge::new(&self.config);
        for elem in elements {
            sponge.absorb(elem);
        }
        sponge.squeeze_field_elements(1)[0]
    }

    pub fn config(&self) -> &PoseidonConfig<Fr> {
        &self.config
    }
}

impl Default for PoseidonHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Map arbitrary bytes to a field element through a tagged SHA-256.
pub fn digest_to_field(tag: &[u8], bytes: &[u8]) -> Fr {
    let mut hasher = Sha256::new();
    hasher.update((tag.len() as u32).to_be_bytes());
    hasher.update(tag);
    hasher.update(bytes);
    Fr::from_be_bytes_mod_order(&hasher.finalize())
}
