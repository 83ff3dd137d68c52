//! Groth16 backend for the membership circuit.
//!
//! Proof encoding: base64 of the compressed Groth16 proof followed by the
//! compressed commitment. The verifier rebuilds the remaining public inputs
//! from the statement it is given.

use std::sync::Arc;

use ark_bn254::{Bn254, Fr};
use ark_groth16::{Groth16, PreparedVerifyingKey, Proof, ProvingKey, VerifyingKey};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use ark_snark::SNARK;
use ark_std::rand::{rngs::StdRng, SeedableRng};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::rngs::OsRng;
use tracing::debug;

use super::{BackendError, ProofBackend, PublicStatement};
use crate::circuit::{public_inputs, CircuitInput, MembershipCircuit};
use crate::nonce::NonceBinder;

struct Keys {
    proving_key: ProvingKey<Bn254>,
    prepared_vk: PreparedVerifyingKey<Bn254>,
    binder: NonceBinder,
}

/// Groth16 prover and verifier sharing one key pair.
#[derive(Clone)]
pub struct Groth16Backend {
    keys: Arc<Keys>,
}

impl Groth16Backend {
    /// Circuit-specific setup from a seeded RNG.
    ///
    /// Anyone who knows `seed` can forge proofs. Production keys come from a
    /// ceremony and are loaded with [`Self::from_proving_key_bytes`].
    pub fn setup(seed: u64) -> Result<Self, BackendError> {
        let binder = NonceBinder::new();
        let circuit = MembershipCircuit::blank(binder.hasher());
        let mut rng = StdRng::seed_from_u64(seed);

        let (pk, _vk) = Groth16::<Bn254>::circuit_specific_setup(circuit, &mut rng)
            .map_err(|e| BackendError::Setup(e.to_string()))?;
        Self::from_proving_key(pk, binder)
    }

    fn from_proving_key(proving_key: ProvingKey<Bn254>, binder: NonceBinder) -> Result<Self, BackendError> {
        let prepared_vk =
            Groth16::<Bn254>::process_vk(&proving_key.vk).map_err(|e| BackendError::Setup(e.to_string()))?;
        Ok(Self {
            keys: Arc::new(Keys {
                proving_key,
                prepared_vk,
                binder,
            }),
        })
    }

    pub fn from_proving_key_bytes(bytes: &[u8]) -> Result<Self, BackendError> {
        let pk = ProvingKey::<Bn254>::deserialize_compressed(bytes)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;
        Self::from_proving_key(pk, NonceBinder::new())
    }

    pub fn proving_key_bytes(&self) -> Result<Vec<u8>, BackendError> {
        let mut bytes = Vec::new();
        self.keys
            .proving_key
            .serialize_compressed(&mut bytes)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    pub fn verifying_key(&self) -> &VerifyingKey<Bn254> {
        &self.keys.proving_key.vk
    }

    pub fn verifying_key_bytes(&self) -> Result<Vec<u8>, BackendError> {
        let mut bytes = Vec::new();
        self.verifying_key()
            .serialize_compressed(&mut bytes)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;
        Ok(bytes)
    }

    fn prove_blocking(keys: &Keys, input: &CircuitInput) -> Result<String, BackendError> {
        let circuit = MembershipCircuit::from_input(input, &keys.binder)?;
        let commitment = circuit
            .commitment()
            .ok_or_else(|| BackendError::InvalidInput("missing commitment".to_string()))?;

        let proof = Groth16::<Bn254>::prove(&keys.proving_key, circuit, &mut OsRng)
            .map_err(|e| BackendError::Prove(e.to_string()))?;

        let mut bytes = Vec::new();
        proof
            .serialize_compressed(&mut bytes)
            .and_then(|_| commitment.serialize_compressed(&mut bytes))
            .map_err(|e| BackendError::Serialization(e.to_string()))?;
        Ok(STANDARD.encode(bytes))
    }

    fn decode(proof: &str) -> Result<(Proof<Bn254>, Fr), BackendError> {
        let bytes = STANDARD
            .decode(proof)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;
        let mut reader = bytes.as_slice();
        let groth = Proof::<Bn254>::deserialize_compressed(&mut reader)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;
        let commitment =
            Fr::deserialize_compressed(&mut reader).map_err(|e| BackendError::Serialization(e.to_string()))?;
        if !reader.is_empty() {
            return Err(BackendError::Serialization("trailing bytes after proof".to_string()));
        }
        Ok((groth, commitment))
    }
}

#[async_trait]
impl ProofBackend for Groth16Backend {
    fn name(&self) -> &'static str {
        "groth16"
    }

    async fn generate_proof(&self, input: &CircuitInput) -> Result<String, BackendError> {
        let keys = self.keys.clone();
        let input = input.clone();
        let proof = tokio::task::spawn_blocking(move || Self::prove_blocking(&keys, &input))
            .await
            .map_err(|e| BackendError::Prove(format!("proving task failed: {}", e)))??;
        debug!(bytes = proof.len(), "Groth16 proof generated");
        Ok(proof)
    }

    async fn verify_proof(&self, proof: &str, statement: &PublicStatement) -> Result<bool, BackendError> {
        let (groth, commitment) = Self::decode(proof)?;
        let inputs = public_inputs(statement, commitment)?;
        Groth16::<Bn254>::verify_with_processed_vk(&self.keys.prepared_vk, &inputs, &groth)
            .map_err(|e| BackendError::Verify(e.to_string()))
    }
}
