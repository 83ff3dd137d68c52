//! Wiring of every component, built once at startup.

use std::sync::Arc;

use tracing::info;

use crate::backend::ProofBackend;
use crate::clock::{Clock, SystemClock};
use crate::config::NymphConfig;
use crate::error::{Error, Result};
use crate::keys::EphemeralKeyManager;
use crate::oauth::IdentityAuthenticator;
use crate::pipeline::MessageSigningPipeline;
use crate::provider::{AnonymousMembershipProvider, GoogleProvider, MicrosoftProvider, ProviderRegistry};
use crate::store::{MemoryStore, SecretStore};
use crate::transport::{InMemoryTransport, MessageTransport};

/// Shared handles to the configured components.
///
/// ```ignore
/// let ctx = NymphContext::builder()
///     .backend(Arc::new(MockProofBackend::new()))
///     .authenticator(Arc::new(authenticator))
///     .build()?;
/// ctx.pipeline().register_identity("google").await?;
/// ```
pub struct NymphContext {
    config: NymphConfig,
    clock: Arc<dyn Clock>,
    store: Arc<dyn SecretStore>,
    keys: Arc<EphemeralKeyManager>,
    providers: ProviderRegistry,
    transport: Arc<dyn MessageTransport>,
    pipeline: MessageSigningPipeline,
}

impl NymphContext {
    pub fn builder() -> NymphContextBuilder {
        NymphContextBuilder::default()
    }

    pub fn config(&self) -> &NymphConfig {
        &self.config
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn store(&self) -> &Arc<dyn SecretStore> {
        &self.store
    }

    pub fn keys(&self) -> &Arc<EphemeralKeyManager> {
        &self.keys
    }

    pub fn providers(&self) -> &ProviderRegistry {
        &self.providers
    }

    pub fn provider(&self, name: &str) -> Result<Arc<dyn AnonymousMembershipProvider>> {
        self.providers.get(name)
    }

    pub fn transport(&self) -> &Arc<dyn MessageTransport> {
        &self.transport
    }

    pub fn pipeline(&self) -> &MessageSigningPipeline {
        &self.pipeline
    }
}

#[derive(Default)]
pub struct NymphContextBuilder {
    config: Option<NymphConfig>,
    clock: Option<Arc<dyn Clock>>,
    store: Option<Arc<dyn SecretStore>>,
    transport: Option<Arc<dyn MessageTransport>>,
    backend: Option<Arc<dyn ProofBackend>>,
    authenticator: Option<Arc<dyn IdentityAuthenticator>>,
    extra_providers: Vec<Arc<dyn AnonymousMembershipProvider>>,
}

impl NymphContextBuilder {
    pub fn config(mut self, config: NymphConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn store(mut self, store: Arc<dyn SecretStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn MessageTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn backend(mut self, backend: Arc<dyn ProofBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn IdentityAuthenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    /// Register an additional provider. One with the name of a built-in
    /// provider replaces it.
    pub fn provider(mut self, provider: Arc<dyn AnonymousMembershipProvider>) -> Self {
        self.extra_providers.push(provider);
        self
    }

    /// Validate the configuration and wire the components. Unset clock,
    /// store and transport default to the system clock and in-memory
    /// adapters; a backend and an authenticator are required.
    pub fn build(self) -> Result<NymphContext> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let backend = self
            .backend
            .ok_or_else(|| Error::Config("a proof backend is required".to_string()))?;
        let authenticator = self
            .authenticator
            .ok_or_else(|| Error::Config("an identity authenticator is required".to_string()))?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(SystemClock) as Arc<dyn Clock>);
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()) as Arc<dyn SecretStore>);
        let transport = self
            .transport
            .unwrap_or_else(|| Arc::new(InMemoryTransport::new()) as Arc<dyn MessageTransport>);

        let keys = Arc::new(EphemeralKeyManager::new(store.clone(), clock.clone(), config.key_ttl_secs));

        let mut providers = ProviderRegistry::new();
        providers.register(Arc::new(GoogleProvider::new(
            &config,
            store.clone(),
            authenticator.clone(),
            backend.clone(),
            clock.clone(),
        )?));
        providers.register(Arc::new(MicrosoftProvider::new(
            &config,
            store.clone(),
            authenticator,
            backend.clone(),
            clock.clone(),
        )?));
        for provider in self.extra_providers {
            providers.register(provider);
        }

        let pipeline = MessageSigningPipeline::new(
            keys.clone(),
            providers.clone(),
            transport.clone(),
            store.clone(),
            clock.clone(),
        );

        info!(
            backend = backend.name(),
            providers = ?providers.names().collect::<Vec<_>>(),
            key_ttl_secs = config.key_ttl_secs,
            "Context ready"
        );

        Ok(NymphContext {
            config,
            clock,
            store,
            keys,
            providers,
            transport,
            pipeline,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockProofBackend;
    use crate::clock::ManualClock;
    use crate::jwt::testing::google_token;
    use crate::oauth::StaticAuthenticator;

    const NOW: u64 = 1_700_000_000;

    fn authenticator() -> Arc<StaticAuthenticator> {
        Arc::new(StaticAuthenticator::token(google_token(
            "dana@acme.com",
            Some("acme.com"),
            NOW + 3600,
        )))
    }

    #[test]
    fn test_requires_backend_and_authenticator() {
        assert!(matches!(
            NymphContext::builder().authenticator(authenticator()).build(),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            NymphContext::builder()
                .backend(Arc::new(MockProofBackend::new()))
                .build(),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = NymphConfig {
            key_ttl_secs: 0,
            ..NymphConfig::default()
        };
        let result = NymphContext::builder()
            .config(config)
            .backend(Arc::new(MockProofBackend::new()))
            .authenticator(authenticator())
            .build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_default_wiring() {
        let ctx = NymphContext::builder()
            .config(NymphConfig {
                key_ttl_secs: 600,
                ..NymphConfig::default()
            })
            .clock(Arc::new(ManualClock::new(NOW)))
            .backend(Arc::new(MockProofBackend::new()))
            .authenticator(authenticator())
            .build()
            .unwrap();

        assert_eq!(ctx.providers().names().collect::<Vec<_>>(), vec!["google", "microsoft"]);
        assert!(matches!(ctx.provider("github"), Err(Error::UnknownProvider(_))));

        let registration = ctx.pipeline().register_identity("google").await.unwrap();
        assert_eq!(registration.ephemeral_pubkey_expiry, NOW + 600);

        let key = ctx.keys().current().await.unwrap().unwrap();
        assert_eq!(*key.public_key(), registration.ephemeral_pubkey);
        assert!(ctx.provider("google").unwrap().is_authenticated().await.unwrap());
    }
}
