//! Anonymous membership providers.
//!
//! A provider turns an organizational sign-in into a proof that the holder
//! of an ephemeral key belongs to an organization's domain, and checks such
//! proofs for others. Google and Microsoft share one implementation,
//! [`OAuthProvider`], parameterized by a [`ProviderProfile`].

mod google;
mod microsoft;
mod oauth_provider;

pub use google::{Google, GoogleProvider};
pub use microsoft::{Microsoft, MicrosoftProvider};
pub use oauth_provider::{OAuthProvider, ProviderProfile};

pub use crate::jwt::ProviderKind;

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::EphemeralPublicKey;
use crate::error::{Error, Result};
use crate::jwt::IdentityToken;
use crate::keys::EphemeralKey;

/// An anonymity set: everyone verified at one organization domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnonGroup {
    /// Normalized domain.
    pub id: String,
    pub title: String,
    pub logo_url: String,
}

/// Provider-specific assertion carried next to a proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofArgs {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    /// Entra ID directory the signer belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl ProofArgs {
    /// The copy that may leave the device: no email address.
    pub fn redacted(&self) -> Self {
        Self {
            domain: self.domain.clone(),
            email: None,
            issuer: self.issuer.clone(),
            tenant_id: self.tenant_id.clone(),
        }
    }
}

/// Output of [`AnonymousMembershipProvider::generate_proof`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipProof {
    pub proof: String,
    pub anon_group: AnonGroup,
    pub proof_args: ProofArgs,
}

/// What a provider knows about the signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub email: Option<String>,
    pub domain: String,
    pub name: Option<String>,
}

/// Session state of one provider instance.
///
/// ```text
/// Unauthenticated -> Authenticating -> Authenticated -> ProofPending -> ProofReady
/// ```
///
/// Sign-out returns to `Unauthenticated`. Proving for a rotated key moves
/// `ProofReady` back to `ProofPending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProviderState {
    Unauthenticated,
    Authenticating,
    Authenticated,
    ProofPending,
    ProofReady,
}

#[async_trait]
pub trait AnonymousMembershipProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn name(&self) -> &'static str {
        self.kind().name()
    }

    fn state(&self) -> ProviderState;

    /// Run the external sign-in and keep the resulting token.
    async fn authenticate(&self) -> Result<IdentityToken>;

    /// Prove membership of the signed-in user's domain, bound to `key`.
    async fn generate_proof(&self, key: &EphemeralKey) -> Result<MembershipProof>;

    /// Whether `proof` shows that `ephemeral_pubkey` belongs to `anon_group_id`.
    ///
    /// Invalid proofs, group mismatches, expired keys and backend failures
    /// all yield `false`.
    async fn verify_proof(
        &self,
        proof: &str,
        anon_group_id: &str,
        ephemeral_pubkey: &EphemeralPublicKey,
        ephemeral_pubkey_expiry: u64,
        proof_args: &ProofArgs,
    ) -> bool;

    fn get_anon_group(&self, domain_id: &str) -> AnonGroup;

    /// A live token is stored for this provider.
    async fn is_authenticated(&self) -> Result<bool>;

    async fn user_info(&self) -> Result<Option<UserInfo>>;

    /// Forget the stored token and PKCE state.
    async fn sign_out(&self) -> Result<()>;
}

/// Providers by name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<&'static str, Arc<dyn AnonymousMembershipProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn AnonymousMembershipProvider>) {
        self.providers.insert(provider.name(), provider);
    }

    pub fn get(&self, name: &str) -> Result<Arc<dyn AnonymousMembershipProvider>> {
        self.providers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::UnknownProvider(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.providers.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn AnonymousMembershipProvider>> {
        self.providers.values()
    }
}
