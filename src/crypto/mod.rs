//! Cryptographic building blocks.

pub mod poseidon;
pub mod signature;

pub use poseidon::{digest_to_field, PoseidonHasher};
pub use signature::{EphemeralPublicKey, EphemeralSignature};
