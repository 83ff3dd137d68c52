//! Proof-system seam.
//!
//! A [`ProofBackend`] turns a [`CircuitInput`] into an opaque proof string
//! and later checks that string against the [`PublicStatement`] a verifier
//! expects. Two implementations ship with the crate:
//!
//! - [`MockProofBackend`]: transparent, statement-binding, no zero knowledge.
//! - [`Groth16Backend`]: Groth16 over BN254 for the membership circuit.

mod groth16;
mod mock;

pub use groth16::Groth16Backend;
pub use mock::MockProofBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::circuit::CircuitInput;
use crate::crypto::EphemeralPublicKey;
use crate::error::Error;

/// Failures inside a proof backend.
///
/// "The proof does not verify" is `Ok(false)`, not an error.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Setup failed: {0}")]
    Setup(String),

    #[error("Invalid circuit input: {0}")]
    InvalidInput(String),

    #[error("Proving failed: {0}")]
    Prove(String),

    #[error("Verification failed: {0}")]
    Verify(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl BackendError {
    pub fn into_generation_error(self) -> Error {
        Error::ProofGeneration(self.to_string())
    }

    pub fn into_verification_error(self) -> Error {
        Error::ProofVerification(self.to_string())
    }
}

/// What a membership proof asserts, as seen by a verifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicStatement {
    /// Normalized organization domain (the anonymous group id).
    pub domain: String,
    pub ephemeral_pubkey: EphemeralPublicKey,
    /// Key expiry, unix seconds.
    pub expiry: u64,
}

#[async_trait]
pub trait ProofBackend: Send + Sync {
    /// Short identifier for logs.
    fn name(&self) -> &'static str;

    async fn generate_proof(&self, input: &CircuitInput) -> Result<String, BackendError>;

    async fn verify_proof(&self, proof: &str, statement: &PublicStatement) -> Result<bool, BackendError>;
}
