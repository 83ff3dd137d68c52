//! Durable secret storage port.
//!
//! The platform supplies the backing (secure enclave on mobile, browser
//! storage on web); this crate only sees string get/set/delete.

mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;

use crate::error::Result;

/// Per-key durable string storage.
///
/// Failures surface as [`crate::Error::Storage`]. `delete` of an absent
/// key is not an error.
#[async_trait]
pub trait SecretStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;
}

/// Logical keys of the persisted local state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageKey {
    EphemeralKey,
    CurrentGroupId,
    CurrentProvider,
    CurrentMembership,
    /// Raw identity token for the named provider.
    IdentityToken(&'static str),
    /// PKCE verifiers keyed by OAuth `state` for the named provider.
    PkceState(&'static str),
}

impl StorageKey {
    pub fn as_string(&self) -> String {
        match self {
            StorageKey::EphemeralKey => "ephemeralKey".to_string(),
            StorageKey::CurrentGroupId => "currentGroupId".to_string(),
            StorageKey::CurrentProvider => "currentProvider".to_string(),
            StorageKey::CurrentMembership => "currentMembership".to_string(),
            StorageKey::IdentityToken(provider) => format!("{}OAuthState", provider),
            StorageKey::PkceState(provider) => format!("{}OAuthNonce", provider),
        }
    }
}
