//! Membership provider backed by an OAuth/OpenID Connect identity token.

use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{AnonGroup, AnonymousMembershipProvider, MembershipProof, ProofArgs, ProviderState, UserInfo};
use crate::backend::{ProofBackend, PublicStatement};
use crate::circuit::CircuitInputBuilder;
use crate::clock::Clock;
use crate::config::{NymphConfig, OAuthClientConfig};
use crate::crypto::EphemeralPublicKey;
use crate::error::{Error, Result};
use crate::jwt::{Claims, DomainExtractor, IdentityToken, JwtSigningKey, ProviderKind};
use crate::keys::EphemeralKey;
use crate::nonce::BindingNonce;
use crate::oauth::{IdentityAuthenticator, PkceStateStore};
use crate::store::{SecretStore, StorageKey};

/// What differs between identity providers.
pub trait ProviderProfile: Send + Sync + 'static {
    const KIND: ProviderKind;

    fn client_config(config: &NymphConfig) -> &OAuthClientConfig;

    fn group_title(domain: &str) -> String;

    /// Directory identifier published with the proof, if the provider has one.
    fn tenant_id(_claims: &Claims) -> Option<String> {
        None
    }
}

struct Session {
    state: ProviderState,
    /// Nonce of the key the last successful proof was made for.
    proven_nonce: Option<BindingNonce>,
}

pub struct OAuthProvider<P: ProviderProfile> {
    client: OAuthClientConfig,
    extractor: DomainExtractor,
    signing_keys: Vec<JwtSigningKey>,
    auth_timeout: Duration,
    store: Arc<dyn SecretStore>,
    authenticator: Arc<dyn IdentityAuthenticator>,
    backend: Arc<dyn ProofBackend>,
    clock: Arc<dyn Clock>,
    pkce: PkceStateStore,
    session: Mutex<Session>,
    _profile: PhantomData<P>,
}

impl<P: ProviderProfile> OAuthProvider<P> {
    pub fn new(
        config: &NymphConfig,
        store: Arc<dyn SecretStore>,
        authenticator: Arc<dyn IdentityAuthenticator>,
        backend: Arc<dyn ProofBackend>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let client = P::client_config(config).clone();
        let signing_keys = client
            .signing_keys
            .iter()
            .map(JwtSigningKey::from_jwk)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            extractor: DomainExtractor::from_config(config),
            signing_keys,
            auth_timeout: Duration::from_secs(config.auth_timeout_secs),
            pkce: PkceStateStore::new(store.clone(), P::KIND, clock.clone(), config.auth_timeout_secs),
            client,
            store,
            authenticator,
            backend,
            clock,
            session: Mutex::new(Session {
                state: ProviderState::Unauthenticated,
                proven_nonce: None,
            }),
            _profile: PhantomData,
        })
    }

    pub fn client(&self) -> &OAuthClientConfig {
        &self.client
    }

    pub fn pkce(&self) -> &PkceStateStore {
        &self.pkce
    }

    fn token_key(&self) -> String {
        StorageKey::IdentityToken(P::KIND.name()).as_string()
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, state: ProviderState) -> ProviderState {
        let mut session = self.session();
        let previous = std::mem::replace(&mut session.state, state);
        if previous != state {
            debug!(provider = P::KIND.name(), from = ?previous, to = ?state, "Provider state changed");
        }
        previous
    }

    fn check_issuer(&self, claims: &Claims) -> Result<()> {
        if self.client.issuers.is_empty() {
            return Ok(());
        }
        match claims.iss.as_deref() {
            Some(iss) if self.client.issuers.iter().any(|prefix| iss.starts_with(prefix.as_str())) => Ok(()),
            Some(iss) => Err(Error::AuthProvider(format!("unexpected token issuer {}", iss))),
            None => Err(Error::AuthProvider("token has no issuer".to_string())),
        }
    }

    /// The configured key that verifies `token`, or `None` when no keys
    /// are configured.
    fn verifying_key(&self, token: &IdentityToken) -> Result<Option<&JwtSigningKey>> {
        if self.signing_keys.is_empty() {
            return Ok(None);
        }
        let kid = token.header().kid.as_deref();
        self.signing_keys
            .iter()
            .filter(|k| kid.is_none() || k.kid().is_none() || k.kid() == kid)
            .find(|k| k.verify(token).is_ok())
            .map(Some)
            .ok_or_else(|| Error::InvalidTokenSignature(format!("no configured {} key verifies the token", P::KIND)))
    }

    async fn stored_token(&self) -> Result<Option<IdentityToken>> {
        match self.store.get(&self.token_key()).await? {
            Some(raw) => IdentityToken::parse(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn run_authentication(&self) -> Result<IdentityToken> {
        let response = tokio::time::timeout(self.auth_timeout, self.authenticator.authenticate(P::KIND))
            .await
            .map_err(|_| Error::AuthTimeout(self.auth_timeout.as_secs()))??;

        let token = IdentityToken::parse(&response.id_token)?;
        self.check_issuer(token.claims())?;
        if !token.claims().is_live(self.clock.now()) {
            return Err(Error::AuthProvider("identity token has expired".to_string()));
        }
        if self.verifying_key(&token)?.is_none() {
            warn!(provider = P::KIND.name(), "No signing keys configured, token signature not checked");
        }
        self.extractor.extract(token.claims(), P::KIND)?;

        self.store.set(&self.token_key(), token.raw()).await?;
        Ok(token)
    }
}

#[async_trait]
impl<P: ProviderProfile> AnonymousMembershipProvider for OAuthProvider<P> {
    fn kind(&self) -> ProviderKind {
        P::KIND
    }

    fn state(&self) -> ProviderState {
        self.session().state
    }

    async fn authenticate(&self) -> Result<IdentityToken> {
        let previous = self.set_state(ProviderState::Authenticating);
        info!(provider = P::KIND.name(), "Authentication started");

        match self.run_authentication().await {
            Ok(token) => {
                let mut session = self.session();
                session.state = ProviderState::Authenticated;
                session.proven_nonce = None;
                info!(provider = P::KIND.name(), "Authentication finished");
                Ok(token)
            }
            Err(e) => {
                self.set_state(previous);
                warn!(provider = P::KIND.name(), error = %e, "Authentication failed");
                Err(e)
            }
        }
    }

    async fn generate_proof(&self, key: &EphemeralKey) -> Result<MembershipProof> {
        let name = P::KIND.name();
        let now = self.clock.now();
        let token = self
            .stored_token()
            .await?
            .filter(|t| t.claims().is_live(now))
            .ok_or_else(|| Error::NotAuthenticated(name.to_string()))?;

        let extracted = self.extractor.extract(token.claims(), P::KIND)?;
        if now >= key.expiry() {
            return Err(Error::ProofGeneration("ephemeral key has expired".to_string()));
        }

        let input = CircuitInputBuilder::new(&token, &extracted.domain)
            .ephemeral_key(key)
            .signing_key(self.verifying_key(&token)?)
            .build()?;

        {
            let mut session = self.session();
            if session.state == ProviderState::ProofReady && session.proven_nonce != Some(*key.binding_hash()) {
                info!(provider = name, "Ephemeral key changed, proof must be regenerated");
            }
            session.state = ProviderState::ProofPending;
        }

        let proof = match self.backend.generate_proof(&input).await {
            Ok(proof) => proof,
            Err(e) => {
                self.set_state(ProviderState::Authenticated);
                warn!(provider = name, backend = self.backend.name(), error = %e, "Proof generation failed");
                return Err(e.into_generation_error());
            }
        };

        {
            let mut session = self.session();
            session.state = ProviderState::ProofReady;
            session.proven_nonce = Some(*key.binding_hash());
        }
        info!(
            provider = name,
            backend = self.backend.name(),
            domain = %extracted.domain,
            pubkey = %key.public_key().short(),
            "Membership proof generated"
        );

        Ok(MembershipProof {
            proof,
            anon_group: self.get_anon_group(&extracted.domain),
            proof_args: ProofArgs {
                domain: extracted.domain,
                email: extracted.email,
                issuer: token.claims().iss.clone(),
                tenant_id: P::tenant_id(token.claims()),
            },
        })
    }

    async fn verify_proof(
        &self,
        proof: &str,
        anon_group_id: &str,
        ephemeral_pubkey: &EphemeralPublicKey,
        ephemeral_pubkey_expiry: u64,
        proof_args: &ProofArgs,
    ) -> bool {
        let name = P::KIND.name();
        if proof_args.domain != anon_group_id {
            debug!(provider = name, group = anon_group_id, "Proof rejected: domain does not match group");
            return false;
        }
        if self.clock.now() >= ephemeral_pubkey_expiry {
            debug!(provider = name, pubkey = %ephemeral_pubkey.short(), "Proof rejected: key expired");
            return false;
        }

        let statement = PublicStatement {
            domain: anon_group_id.to_string(),
            ephemeral_pubkey: *ephemeral_pubkey,
            expiry: ephemeral_pubkey_expiry,
        };
        match self.backend.verify_proof(proof, &statement).await {
            Ok(valid) => {
                debug!(provider = name, group = anon_group_id, valid, "Proof checked");
                valid
            }
            Err(e) => {
                warn!(provider = name, error = %e.into_verification_error(), "Proof rejected: backend error");
                false
            }
        }
    }

    fn get_anon_group(&self, domain_id: &str) -> AnonGroup {
        AnonGroup {
            id: domain_id.to_string(),
            title: P::group_title(domain_id),
            logo_url: format!("https://logo.clearbit.com/{}", domain_id),
        }
    }

    async fn is_authenticated(&self) -> Result<bool> {
        let now = self.clock.now();
        Ok(match self.store.get(&self.token_key()).await? {
            Some(raw) => IdentityToken::parse(&raw).map_or(false, |t| t.claims().is_live(now)),
            None => false,
        })
    }

    async fn user_info(&self) -> Result<Option<UserInfo>> {
        let Some(token) = self.stored_token().await? else {
            return Ok(None);
        };
        let extracted = self.extractor.extract(token.claims(), P::KIND)?;
        Ok(Some(UserInfo {
            email: extracted.email.or_else(|| token.claims().email.clone()),
            domain: extracted.domain,
            name: token.claims().name.clone(),
        }))
    }

    async fn sign_out(&self) -> Result<()> {
        self.store.delete(&self.token_key()).await?;
        self.pkce.clear().await?;
        {
            let mut session = self.session();
            session.state = ProviderState::Unauthenticated;
            session.proven_nonce = None;
        }
        info!(provider = P::KIND.name(), "Signed out");
        Ok(())
    }
}
