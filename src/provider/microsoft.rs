use super::{OAuthProvider, ProviderKind, ProviderProfile};
use crate::config::{NymphConfig, OAuthClientConfig};
use crate::jwt::Claims;

/// Microsoft Entra ID: the group is the domain of `upn`, `email` or
/// `preferred_username`, in that order.
pub struct Microsoft;

impl ProviderProfile for Microsoft {
    const KIND: ProviderKind = ProviderKind::Microsoft;

    fn client_config(config: &NymphConfig) -> &OAuthClientConfig {
        &config.microsoft
    }

    fn group_title(domain: &str) -> String {
        format!("{} Microsoft 365", domain)
    }

    fn tenant_id(claims: &Claims) -> Option<String> {
        claims.tid.clone()
    }
}

pub type MicrosoftProvider = OAuthProvider<Microsoft>;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::backend::MockProofBackend;
    use crate::clock::ManualClock;
    use crate::error::Error;
    use crate::jwt::testing::token;
    use crate::keys::EphemeralKey;
    use crate::oauth::StaticAuthenticator;
    use crate::provider::AnonymousMembershipProvider;
    use crate::store::MemoryStore;

    const NOW: u64 = 1_700_000_000;

    fn provider(claims: serde_json::Value) -> MicrosoftProvider {
        MicrosoftProvider::new(
            &NymphConfig::default(),
            Arc::new(MemoryStore::new()),
            Arc::new(StaticAuthenticator::token(token(claims))),
            Arc::new(MockProofBackend::new()),
            Arc::new(ManualClock::new(NOW)),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_upn_domain_group() {
        let p = provider(json!({
            "iss": "https://login.microsoftonline.com/9188040d-6c67-4c5b-b112-36a304b66dad/v2.0",
            "upn": "carol@contoso.com",
            "tid": "9188040d-6c67-4c5b-b112-36a304b66dad",
            "exp": NOW + 3600
        }));
        p.authenticate().await.unwrap();

        let key = EphemeralKey::from_secret([4u8; 32], [5u8; 32], NOW + 60);
        let proof = p.generate_proof(&key).await.unwrap();
        assert_eq!(proof.anon_group.id, "contoso.com");
        assert_eq!(proof.anon_group.title, "contoso.com Microsoft 365");
        assert_eq!(
            proof.proof_args.tenant_id.as_deref(),
            Some("9188040d-6c67-4c5b-b112-36a304b66dad")
        );
        assert_eq!(p.name(), "microsoft");
    }

    #[tokio::test]
    async fn test_entra_token_without_verification_claim() {
        let p = provider(json!({
            "iss": "https://login.microsoftonline.com/72f988bf-86f1-41af-91ab-2d7cd011db47/v2.0",
            "upn": "dave@fabrikam.com",
            "preferred_username": "dave@fabrikam.com",
            "tid": "72f988bf-86f1-41af-91ab-2d7cd011db47",
            "exp": NOW + 3600
        }));
        p.authenticate().await.unwrap();

        let info = p.user_info().await.unwrap().unwrap();
        assert_eq!(info.domain, "fabrikam.com");
    }

    #[tokio::test]
    async fn test_google_issuer_rejected() {
        let p = provider(json!({
            "iss": "https://accounts.google.com",
            "email": "carol@contoso.com",
            "exp": NOW + 3600
        }));
        assert!(matches!(p.authenticate().await, Err(Error::AuthProvider(_))));
    }
}
