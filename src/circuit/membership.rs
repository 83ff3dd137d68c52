//! Domain membership circuit bound to one ephemeral key.
//!
//! Proves knowledge of a key salt and an identity-token digest such that
//!
//! ```text
//! nonce      = Poseidon(pubkey, salt, expiry)
//! commitment = Poseidon(token_hash, domain_hash, nonce)
//! ```
//!
//! Public inputs, in allocation order: `domain_hash`, `pubkey`, `expiry`,
//! `commitment`. Private witnesses: `salt`, `token_hash`.
//!
//! The nonce is the same value [`NonceBinder`] computes natively, so a
//! proof only verifies for the key generation it was made for.

use ark_bn254::Fr;
use ark_crypto_primitives::sponge::{
    constraints::CryptographicSpongeVar,
    poseidon::{constraints::PoseidonSpongeVar, PoseidonConfig},
};
use ark_r1cs_std::{alloc::AllocVar, eq::EqGadget, fields::fp::FpVar};
use ark_relations::r1cs::{ConstraintSynthesizer, ConstraintSystemRef, SynthesisError};

use super::CircuitInput;
use crate::backend::{BackendError, PublicStatement};
use crate::crypto::{digest_to_field, PoseidonHasher};
use crate::jwt::{to_fixed_width_bytes, MAX_DOMAIN_LEN};
use crate::nonce::NonceBinder;

const DOMAIN_TAG: &[u8] = b"nymph/membership/domain";
const TOKEN_TAG: &[u8] = b"nymph/membership/token";

/// Field image of a domain's fixed-width circuit encoding.
pub fn domain_field(domain: &str) -> Result<Fr, BackendError> {
    let bytes = to_fixed_width_bytes(domain, MAX_DOMAIN_LEN)
        .map_err(|e| BackendError::InvalidInput(e.to_string()))?;
    Ok(digest_to_field(DOMAIN_TAG, &bytes))
}

/// Public inputs a verifier derives from the statement and the proof's commitment.
pub fn public_inputs(statement: &PublicStatement, commitment: Fr) -> Result<Vec<Fr>, BackendError> {
    Ok(vec![
        domain_field(&statement.domain)?,
        NonceBinder::pubkey_field(&statement.ephemeral_pubkey),
        NonceBinder::expiry_field(statement.expiry),
        commitment,
    ])
}

#[derive(Clone)]
pub struct MembershipCircuit {
    pub poseidon_config: PoseidonConfig<Fr>,

    pub salt: Option<Fr>,
    pub token_hash: Option<Fr>,

    pub domain_hash: Option<Fr>,
    pub pubkey: Option<Fr>,
    pub expiry: Option<Fr>,
    pub commitment: Option<Fr>,
}

impl MembershipCircuit {
    /// A consistent dummy assignment for key generation.
    pub fn blank(hasher: &PoseidonHasher) -> Self {
        let (salt, token_hash) = (Fr::from(1u64), Fr::from(2u64));
        let (domain_hash, pubkey, expiry) = (Fr::from(3u64), Fr::from(4u64), Fr::from(5u64));
        let nonce = hasher.hash_many(&[pubkey, salt, expiry]);
        let commitment = hasher.hash_many(&[token_hash, domain_hash, nonce]);

        Self {
            poseidon_config: hasher.config().clone(),
            salt: Some(salt),
            token_hash: Some(token_hash),
            domain_hash: Some(domain_hash),
            pubkey: Some(pubkey),
            expiry: Some(expiry),
            commitment: Some(commitment),
        }
    }

    /// Witness assignment for `input`.
    ///
    /// Fails if `input.nonce` is not the binding nonce of its own key fields.
    pub fn from_input(input: &CircuitInput, binder: &NonceBinder) -> Result<Self, BackendError> {
        let expected = binder.bind(&input.ephemeral_pubkey, &input.ephemeral_pubkey_salt, input.ephemeral_pubkey_expiry);
        if expected != input.nonce {
            return Err(BackendError::InvalidInput(
                "nonce does not match the ephemeral key fields".to_string(),
            ));
        }

        let domain = input
            .domain_str()
            .map_err(|e| BackendError::InvalidInput(e.to_string()))?;
        let domain_hash = domain_field(domain)?;
        let pubkey = NonceBinder::pubkey_field(&input.ephemeral_pubkey);
        let salt = NonceBinder::salt_field(&input.ephemeral_pubkey_salt);
        let expiry = NonceBinder::expiry_field(input.ephemeral_pubkey_expiry);
        let token_hash = digest_to_field(TOKEN_TAG, &input.signed_data_digest());

        let hasher = binder.hasher();
        let commitment = hasher.hash_many(&[token_hash, domain_hash, input.nonce.to_field()]);

        Ok(Self {
            poseidon_config: hasher.config().clone(),
            salt: Some(salt),
            token_hash: Some(token_hash),
            domain_hash: Some(domain_hash),
            pubkey: Some(pubkey),
            expiry: Some(expiry),
            commitment: Some(commitment),
        })
    }

    pub fn commitment(&self) -> Option<Fr> {
        self.commitment
    }

    pub fn public_inputs(&self) -> Option<Vec<Fr>> {
        Some(vec![self.domain_hash?, self.pubkey?, self.expiry?, self.commitment?])
    }
}

impl ConstraintSynthesizer<Fr> for MembershipCircuit {
    fn generate_constraints(self, cs: ConstraintSystemRef<Fr>) -> Result<(), SynthesisError> {
        let salt = FpVar::new_witness(cs.clone(), || self.salt.ok_or(SynthesisError::AssignmentMissing))?;
        let token_hash =
            FpVar::new_witness(cs.clone(), || self.token_hash.ok_or(SynthesisError::AssignmentMissing))?;

        let domain_hash =
            FpVar::new_input(cs.clone(), || self.domain_hash.ok_or(SynthesisError::AssignmentMissing))?;
        let pubkey = FpVar::new_input(cs.clone(), || self.pubkey.ok_or(SynthesisError::AssignmentMissing))?;
        let expiry = FpVar::new_input(cs.clone(), || self.expiry.ok_or(SynthesisError::AssignmentMissing))?;
        let commitment =
            FpVar::new_input(cs.clone(), || self.commitment.ok_or(SynthesisError::AssignmentMissing))?;

        let nonce = poseidon(cs.clone(), &self.poseidon_config, &[&pubkey, &salt, &expiry])?;
        let computed = poseidon(cs, &self.poseidon_config, &[&token_hash, &domain_hash, &nonce])?;

        computed.enforce_equal(&commitment)?;
        Ok(())
    }
}

fn poseidon(
    cs: ConstraintSystemRef<Fr>,
    config: &PoseidonConfig<Fr>,
    inputs: &[&FpVar<Fr>],
) -> Result<FpVar<Fr>, SynthesisError> {
    let mut sponge = PoseidonSpongeVar::new(cs, config);
    for input in inputs {
        sponge.absorb(*input)?;
    }
    let output = sponge.squeeze_field_elements(1)?;
    Ok(output[0].clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitInputBuilder;
    use crate::jwt::testing::google_token;
    use crate::jwt::IdentityToken;
    use crate::keys::EphemeralKey;
    use ark_relations::r1cs::ConstraintSystem;

    fn input() -> CircuitInput {
        let token = IdentityToken::parse(&google_token("a@acme.com", Some("acme.com"), 2_000_000_000)).unwrap();
        let key = EphemeralKey::from_secret([3u8; 32], [4u8; 32], 1_700_003_600);
        CircuitInputBuilder::new(&token, "acme.com").ephemeral_key(&key).build().unwrap()
    }

    #[test]
    fn test_circuit_satisfied() {
        let circuit = MembershipCircuit::from_input(&input(), &NonceBinder::new()).unwrap();
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_blank_circuit_satisfied() {
        let circuit = MembershipCircuit::blank(&PoseidonHasher::new());
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        assert!(cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_wrong_salt_unsatisfied() {
        let mut circuit = MembershipCircuit::from_input(&input(), &NonceBinder::new()).unwrap();
        circuit.salt = Some(NonceBinder::salt_field(&[5u8; 32]));
        let cs = ConstraintSystem::<Fr>::new_ref();
        circuit.generate_constraints(cs.clone()).unwrap();
        assert!(!cs.is_satisfied().unwrap());
    }

    #[test]
    fn test_mismatched_nonce_rejected() {
        let mut input = input();
        input.ephemeral_pubkey_expiry += 1;
        assert!(matches!(
            MembershipCircuit::from_input(&input, &NonceBinder::new()),
            Err(BackendError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_public_inputs_match_statement() {
        let input = input();
        let circuit = MembershipCircuit::from_input(&input, &NonceBinder::new()).unwrap();
        let commitment = circuit.commitment().unwrap();
        let expected = public_inputs(&input.statement().unwrap(), commitment).unwrap();
        assert_eq!(circuit.public_inputs().unwrap(), expected);
    }
}
