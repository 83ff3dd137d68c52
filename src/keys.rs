//! Ephemeral signing keys.
//!
//! A device holds at most one current key. It is generated on first use,
//! persisted in the [`SecretStore`], and replaced once `now >= expiry`.
//! Every key carries a random salt and the binding nonce over
//! `(public key, salt, expiry)` that its membership proof commits to.
//!
//! Reads and rotation are separate: [`EphemeralKeyManager::current`] never
//! writes, [`EphemeralKeyManager::ensure_valid`] rotates when needed.

use std::sync::Arc;

use ed25519_dalek::{Signer, SigningKey};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::Clock;
use crate::crypto::{EphemeralPublicKey, EphemeralSignature};
use crate::error::{Error, Result};
use crate::nonce::{BindingNonce, NonceBinder};
use crate::store::{SecretStore, StorageKey};

/// An ephemeral Ed25519 keypair with its binding material.
///
/// Does not implement `Serialize`; the private half only leaves memory
/// through the key manager's persistence.
#[derive(Clone)]
pub struct EphemeralKey {
    signing_key: SigningKey,
    public_key: EphemeralPublicKey,
    salt: [u8; 32],
    expiry: u64,
    binding_hash: BindingNonce,
}

impl EphemeralKey {
    fn from_parts(signing_key: SigningKey, salt: [u8; 32], expiry: u64, binder: &NonceBinder) -> Self {
        let public_key = EphemeralPublicKey(signing_key.verifying_key().to_bytes());
        let binding_hash = binder.bind(&public_key, &salt, expiry);
        Self {
            signing_key,
            public_key,
            salt,
            expiry,
            binding_hash,
        }
    }

    /// Rebuild a key from its secret scalar bytes. Used for fixtures and
    /// imports; [`EphemeralKeyManager::generate`] is the normal path.
    pub fn from_secret(secret: [u8; 32], salt: [u8; 32], expiry: u64) -> Self {
        Self::from_parts(SigningKey::from_bytes(&secret), salt, expiry, &NonceBinder::new())
    }

    pub fn public_key(&self) -> &EphemeralPublicKey {
        &self.public_key
    }

    pub fn salt(&self) -> &[u8; 32] {
        &self.salt
    }

    /// Unix seconds after which the key is unusable.
    pub fn expiry(&self) -> u64 {
        self.expiry
    }

    /// Nonce over `(public key, salt, expiry)`.
    pub fn binding_hash(&self) -> &BindingNonce {
        &self.binding_hash
    }

    /// Sign with this exact key.
    pub fn sign(&self, message: &[u8]) -> EphemeralSignature {
        EphemeralSignature(self.signing_key.sign(message).to_bytes())
    }

    fn to_record(&self) -> StoredKey {
        StoredKey {
            private_key: hex::encode(self.signing_key.to_bytes()),
            public_key: self.public_key,
            salt: hex::encode(self.salt),
            expiry: self.expiry,
        }
    }

    fn from_record(record: StoredKey, binder: &NonceBinder) -> Result<Self> {
        let secret: [u8; 32] = decode_32(&record.private_key, "private key")?;
        let salt = decode_32(&record.salt, "salt")?;
        let key = Self::from_parts(SigningKey::from_bytes(&secret), salt, record.expiry, binder);
        if key.public_key != record.public_key {
            return Err(Error::Storage(
                "stored ephemeral public key does not match its private key".to_string(),
            ));
        }
        Ok(key)
    }
}

impl std::fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EphemeralKey")
            .field("public_key", &self.public_key)
            .field("expiry", &self.expiry)
            .field("binding_hash", &self.binding_hash)
            .finish_non_exhaustive()
    }
}

/// Persisted form. The binding hash is recomputed on load, never stored.
#[derive(Serialize, Deserialize)]
struct StoredKey {
    private_key: String,
    public_key: EphemeralPublicKey,
    salt: String,
    expiry: u64,
}

fn decode_32(s: &str, what: &str) -> Result<[u8; 32]> {
    hex::decode(s)
        .ok()
        .and_then(|b| b.try_into().ok())
        .ok_or_else(|| Error::Storage(format!("stored {} is not 32 hex-encoded bytes", what)))
}

/// Owns the current ephemeral key and its persistence.
pub struct EphemeralKeyManager {
    store: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
    binder: NonceBinder,
    ttl_secs: u64,
}

impl EphemeralKeyManager {
    pub fn new(store: Arc<dyn SecretStore>, clock: Arc<dyn Clock>, ttl_secs: u64) -> Self {
        Self {
            store,
            clock,
            binder: NonceBinder::new(),
            ttl_secs,
        }
    }

    /// Generate, persist and return a fresh key, replacing any current one.
    pub async fn generate(&self) -> Result<EphemeralKey> {
        let mut secret = [0u8; 32];
        let mut salt = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut secret)
            .and_then(|_| OsRng.try_fill_bytes(&mut salt))
            .map_err(|e| Error::KeyGeneration(format!("randomness unavailable: {}", e)))?;

        let expiry = self
            .clock
            .now()
            .checked_add(self.ttl_secs)
            .ok_or_else(|| Error::KeyGeneration("expiry overflows".to_string()))?;
        let key = EphemeralKey::from_parts(SigningKey::from_bytes(&secret), salt, expiry, &self.binder);

        let record = serde_json::to_string(&key.to_record())
            .map_err(|e| Error::KeyGeneration(e.to_string()))?;
        self.store
            .set(&StorageKey::EphemeralKey.as_string(), &record)
            .await
            .map_err(|e| Error::KeyGeneration(format!("could not persist key: {}", e)))?;

        info!(pubkey = %key.public_key.short(), expiry, "Generated ephemeral key");
        Ok(key)
    }

    /// The persisted key, expired or not. Never writes.
    pub async fn current(&self) -> Result<Option<EphemeralKey>> {
        let Some(raw) = self.store.get(&StorageKey::EphemeralKey.as_string()).await? else {
            return Ok(None);
        };
        let record: StoredKey = serde_json::from_str(&raw)?;
        EphemeralKey::from_record(record, &self.binder).map(Some)
    }

    /// The current key if still valid; otherwise a freshly generated one.
    pub async fn ensure_valid(&self) -> Result<EphemeralKey> {
        match self.current().await? {
            Some(key) if self.is_valid(&key) => Ok(key),
            Some(key) => {
                info!(pubkey = %key.public_key.short(), "Ephemeral key expired, rotating");
                self.clear().await?;
                self.generate().await
            }
            None => self.generate().await,
        }
    }

    /// `now < expiry`.
    pub fn is_valid(&self, key: &EphemeralKey) -> bool {
        self.clock.now() < key.expiry
    }

    pub fn time_until_expiry(&self, key: &EphemeralKey) -> u64 {
        key.expiry.saturating_sub(self.clock.now())
    }

    /// Sign with the current key. Fails with [`Error::NoKey`] if there is
    /// no current key or it has expired.
    pub async fn sign(&self, message: &[u8]) -> Result<(EphemeralSignature, EphemeralPublicKey)> {
        let key = self
            .current()
            .await?
            .filter(|k| self.is_valid(k))
            .ok_or(Error::NoKey)?;
        Ok((key.sign(message), key.public_key))
    }

    /// Check a signature against a public key alone.
    pub fn verify(message: &[u8], signature: &EphemeralSignature, public_key: &EphemeralPublicKey) -> bool {
        public_key.verify(message, signature)
    }

    /// Delete the persisted key. Idempotent.
    pub async fn clear(&self) -> Result<()> {
        self.store.delete(&StorageKey::EphemeralKey.as_string()).await?;
        debug!("Ephemeral key cleared");
        Ok(())
    }

    pub fn binder(&self) -> &NonceBinder {
        &self.binder
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    const START: u64 = 1_700_000_000;
    const TTL: u64 = 3600;

    fn manager() -> (EphemeralKeyManager, Arc<ManualClock>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(START));
        let store = Arc::new(MemoryStore::new());
        let manager = EphemeralKeyManager::new(store.clone(), clock.clone(), TTL);
        (manager, clock, store)
    }

    #[tokio::test]
    async fn test_generate_persists_and_is_valid() {
        let (manager, _, _) = manager();
        let key = manager.generate().await.unwrap();

        assert_eq!(key.expiry(), START + TTL);
        assert!(manager.is_valid(&key));

        let loaded = manager.current().await.unwrap().unwrap();
        assert_eq!(loaded.public_key(), key.public_key());
        assert_eq!(loaded.binding_hash(), key.binding_hash());
    }

    #[tokio::test]
    async fn test_expiry_is_exact_boundary() {
        let (manager, clock, _) = manager();
        let key = manager.generate().await.unwrap();

        clock.set(key.expiry() - 1);
        assert!(manager.is_valid(&key));
        assert_eq!(manager.time_until_expiry(&key), 1);

        clock.set(key.expiry());
        assert!(!manager.is_valid(&key));
        assert_eq!(manager.time_until_expiry(&key), 0);
    }

    #[tokio::test]
    async fn test_current_does_not_rotate() {
        let (manager, clock, _) = manager();
        let key = manager.generate().await.unwrap();
        clock.advance(TTL);

        let loaded = manager.current().await.unwrap().unwrap();
        assert_eq!(loaded.public_key(), key.public_key());
        assert!(!manager.is_valid(&loaded));
    }

    #[tokio::test]
    async fn test_ensure_valid_rotates_expired_key() {
        let (manager, clock, _) = manager();
        let old = manager.generate().await.unwrap();
        assert_eq!(manager.ensure_valid().await.unwrap().public_key(), old.public_key());

        clock.advance(TTL);
        let fresh = manager.ensure_valid().await.unwrap();
        assert_ne!(fresh.public_key(), old.public_key());
        assert_ne!(fresh.binding_hash(), old.binding_hash());
        assert!(manager.is_valid(&fresh));
    }

    #[tokio::test]
    async fn test_sign_requires_valid_key() {
        let (manager, clock, _) = manager();
        assert!(matches!(manager.sign(b"hi").await, Err(Error::NoKey)));

        let key = manager.generate().await.unwrap();
        let (sig, pk) = manager.sign(b"hi").await.unwrap();
        assert_eq!(&pk, key.public_key());
        assert!(EphemeralKeyManager::verify(b"hi", &sig, &pk));

        clock.advance(TTL);
        assert!(matches!(manager.sign(b"hi").await, Err(Error::NoKey)));
    }

    #[tokio::test]
    async fn test_verify_rejects_other_key() {
        let (manager, _, _) = manager();
        let a = manager.generate().await.unwrap();
        let b = manager.generate().await.unwrap();
        let sig = a.sign(b"message");
        assert!(EphemeralKeyManager::verify(b"message", &sig, a.public_key()));
        assert!(!EphemeralKeyManager::verify(b"message", &sig, b.public_key()));
        assert!(!EphemeralKeyManager::verify(b"messagf", &sig, a.public_key()));
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let (manager, _, _) = manager();
        manager.generate().await.unwrap();
        manager.clear().await.unwrap();
        manager.clear().await.unwrap();
        assert!(manager.current().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces() {
        let (manager, _, store) = manager();
        store.set_failing(true);
        assert!(matches!(manager.generate().await, Err(Error::KeyGeneration(_))));
        assert!(matches!(manager.current().await, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn test_tampered_record_rejected() {
        let (manager, _, store) = manager();
        manager.generate().await.unwrap();

        let key = StorageKey::EphemeralKey.as_string();
        let raw = store.get(&key).await.unwrap().unwrap();
        let mut record: serde_json::Value = serde_json::from_str(&raw).unwrap();
        record["public_key"] = serde_json::Value::String(hex::encode([5u8; 32]));
        store.set(&key, &record.to_string()).await.unwrap();

        assert!(matches!(manager.current().await, Err(Error::Storage(_))));
    }
}
