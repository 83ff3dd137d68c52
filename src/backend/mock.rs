//! Transparent mock backend.
//!
//! A proof is a tagged SHA-256 over the public statement. It binds the
//! statement (domain, key, expiry) but hides nothing and proves nothing
//! about the identity token. Use it for tests and local development only.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use sha2::{Digest, Sha256};

use super::{BackendError, ProofBackend, PublicStatement};
use crate::circuit::CircuitInput;
use crate::nonce::NonceBinder;

const PROOF_TAG: &[u8] = b"nymph/mock-proof/v1";

#[derive(Debug, Clone, Default)]
pub struct MockProofBackend {
    prove_failure: Option<String>,
    verify_failure: Option<String>,
}

impl MockProofBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `generate_proof` call fails with `message`.
    pub fn failing_prove(message: impl Into<String>) -> Self {
        Self {
            prove_failure: Some(message.into()),
            ..Self::default()
        }
    }

    /// Every `verify_proof` call fails with `message`.
    pub fn failing_verify(message: impl Into<String>) -> Self {
        Self {
            verify_failure: Some(message.into()),
            ..Self::default()
        }
    }

    fn tag(statement: &PublicStatement) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(PROOF_TAG);
        hasher.update((statement.domain.len() as u32).to_be_bytes());
        hasher.update(statement.domain.as_bytes());
        hasher.update(statement.ephemeral_pubkey.as_bytes());
        hasher.update(statement.expiry.to_be_bytes());
        hasher.finalize().into()
    }
}

#[async_trait]
impl ProofBackend for MockProofBackend {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn generate_proof(&self, input: &CircuitInput) -> Result<String, BackendError> {
        if let Some(message) = &self.prove_failure {
            return Err(BackendError::Prove(message.clone()));
        }
        let binder = NonceBinder::new();
        if binder.bind(&input.ephemeral_pubkey, &input.ephemeral_pubkey_salt, input.ephemeral_pubkey_expiry)
            != input.nonce
        {
            return Err(BackendError::InvalidInput(
                "nonce does not match the ephemeral key fields".to_string(),
            ));
        }
        let statement = input
            .statement()
            .map_err(|e| BackendError::InvalidInput(e.to_string()))?;
        Ok(STANDARD.encode(Self::tag(&statement)))
    }

    async fn verify_proof(&self, proof: &str, statement: &PublicStatement) -> Result<bool, BackendError> {
        if let Some(message) = &self.verify_failure {
            return Err(BackendError::Verify(message.clone()));
        }
        let bytes = STANDARD
            .decode(proof)
            .map_err(|e| BackendError::Serialization(e.to_string()))?;
        Ok(bytes.as_slice() == Self::tag(statement).as_slice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit::CircuitInputBuilder;
    use crate::jwt::testing::google_token;
    use crate::jwt::IdentityToken;
    use crate::keys::EphemeralKey;

    fn input() -> CircuitInput {
        let token = IdentityToken::parse(&google_token("a@acme.com", None, 2_000_000_000)).unwrap();
        let key = EphemeralKey::from_secret([1u8; 32], [2u8; 32], 1_700_003_600);
        CircuitInputBuilder::new(&token, "acme.com").ephemeral_key(&key).build().unwrap()
    }

    #[tokio::test]
    async fn test_proof_binds_statement() {
        let backend = MockProofBackend::new();
        let input = input();
        let proof = backend.generate_proof(&input).await.unwrap();
        let statement = input.statement().unwrap();
        assert!(backend.verify_proof(&proof, &statement).await.unwrap());

        let other_group = PublicStatement {
            domain: "evil.com".into(),
            ..statement.clone()
        };
        assert!(!backend.verify_proof(&proof, &other_group).await.unwrap());

        let later = PublicStatement {
            expiry: statement.expiry + 1,
            ..statement
        };
        assert!(!backend.verify_proof(&proof, &later).await.unwrap());
    }

    #[tokio::test]
    async fn test_rejects_inconsistent_nonce() {
        let mut input = input();
        input.ephemeral_pubkey_expiry += 60;
        assert!(matches!(
            MockProofBackend::new().generate_proof(&input).await,
            Err(BackendError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_proof_is_error() {
        let statement = input().statement().unwrap();
        let result = MockProofBackend::new().verify_proof("%%%", &statement).await;
        assert!(matches!(result, Err(BackendError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_configured_failures() {
        let input = input();
        assert!(matches!(
            MockProofBackend::failing_prove("offline").generate_proof(&input).await,
            Err(BackendError::Prove(_))
        ));
        let statement = input.statement().unwrap();
        assert!(matches!(
            MockProofBackend::failing_verify("offline").verify_proof("AA==", &statement).await,
            Err(BackendError::Verify(_))
        ));
    }
}
