//! PKCE (RFC 7636) helpers shared by all providers.

use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::jwt::ProviderKind;
use crate::store::{SecretStore, StorageKey};

fn random_urlsafe(len: usize) -> Result<String> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|e| Error::AuthProvider(format!("randomness unavailable: {}", e)))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// 32 random bytes, base64url (43 characters).
pub fn generate_code_verifier() -> Result<String> {
    random_urlsafe(32)
}

/// Opaque OAuth `state` value.
pub fn generate_state() -> Result<String> {
    random_urlsafe(16)
}

/// S256 challenge: `base64url(SHA-256(verifier))`.
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// A sign-in that has been redirected but not yet completed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PendingFlow {
    verifier: String,
    created_at: u64,
}

/// Per-provider map from OAuth `state` to code verifier, kept in the
/// secret store across the redirect.
///
/// Entries older than the sign-in timeout are dropped on the next write
/// and never returned, so abandoned redirects do not accumulate.
pub struct PkceStateStore {
    store: Arc<dyn SecretStore>,
    provider: ProviderKind,
    clock: Arc<dyn Clock>,
    ttl_secs: u64,
}

impl PkceStateStore {
    pub fn new(store: Arc<dyn SecretStore>, provider: ProviderKind, clock: Arc<dyn Clock>, ttl_secs: u64) -> Self {
        Self {
            store,
            provider,
            clock,
            ttl_secs,
        }
    }

    fn key(&self) -> String {
        StorageKey::PkceState(self.provider.name()).as_string()
    }

    fn is_live(&self, flow: &PendingFlow, now: u64) -> bool {
        now < flow.created_at.saturating_add(self.ttl_secs)
    }

    async fn load(&self) -> Result<HashMap<String, PendingFlow>> {
        match self.store.get(&self.key()).await? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(HashMap::new()),
        }
    }

    async fn persist(&self, map: &HashMap<String, PendingFlow>) -> Result<()> {
        if map.is_empty() {
            return self.store.delete(&self.key()).await;
        }
        self.store.set(&self.key(), &serde_json::to_string(map)?).await
    }

    /// Remember `verifier` under `state`, evicting expired flows.
    pub async fn save(&self, state: &str, verifier: &str) -> Result<()> {
        let now = self.clock.now();
        let mut map = self.load().await?;
        map.retain(|_, flow| self.is_live(flow, now));
        map.insert(
            state.to_string(),
            PendingFlow {
                verifier: verifier.to_string(),
                created_at: now,
            },
        );
        self.persist(&map).await
    }

    /// Remove and return the verifier for `state`. Each state is usable once
    /// and only until it expires.
    pub async fn take(&self, state: &str) -> Result<Option<String>> {
        let now = self.clock.now();
        let mut map = self.load().await?;
        let before = map.len();
        let flow = map.remove(state);
        map.retain(|_, flow| self.is_live(flow, now));
        if map.len() != before {
            self.persist(&map).await?;
        }
        Ok(flow
            .filter(|flow| self.is_live(flow, now))
            .map(|flow| flow.verifier))
    }

    /// Number of stored, unexpired flows.
    pub async fn pending(&self) -> Result<usize> {
        let now = self.clock.now();
        Ok(self.load().await?.values().filter(|flow| self.is_live(flow, now)).count())
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.delete(&self.key()).await
    }
}
