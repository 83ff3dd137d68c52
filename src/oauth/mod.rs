//! Identity provider port.
//!
//! Redirects, popups and native SDKs live outside this crate. They are
//! reached through [`IdentityAuthenticator`], which hands back a signed
//! identity token for one provider.

pub mod pkce;

pub use pkce::{code_challenge, generate_code_verifier, generate_state, PkceStateStore};

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::jwt::ProviderKind;

/// Profile details an authenticator may return alongside the token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalUserInfo {
    pub email: Option<String>,
    pub name: Option<String>,
    pub picture: Option<String>,
}

/// Result of a completed sign-in.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub id_token: String,
    #[serde(default)]
    pub user_info: Option<ExternalUserInfo>,
}

impl std::fmt::Debug for AuthResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResponse")
            .field("id_token", &"<redacted>")
            .field("user_info", &self.user_info)
            .finish()
    }
}

/// Performs the interactive OAuth exchange for a provider.
///
/// Implementations report a user abort as [`Error::AuthCancelled`] and any
/// provider-side failure as [`Error::AuthProvider`].
#[async_trait]
pub trait IdentityAuthenticator: Send + Sync {
    async fn authenticate(&self, provider: ProviderKind) -> Result<AuthResponse>;
}

#[derive(Debug, Clone)]
enum Outcome {
    Token(String),
    Cancelled(String),
    ProviderError(String),
}

/// Authenticator with a fixed outcome, optionally after a delay.
#[derive(Debug, Clone)]
pub struct StaticAuthenticator {
    outcome: Outcome,
    delay: Option<Duration>,
}

impl StaticAuthenticator {
    pub fn token(id_token: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Token(id_token.into()),
            delay: None,
        }
    }

    pub fn cancelled(reason: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::Cancelled(reason.into()),
            delay: None,
        }
    }

    pub fn provider_error(message: impl Into<String>) -> Self {
        Self {
            outcome: Outcome::ProviderError(message.into()),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl IdentityAuthenticator for StaticAuthenticator {
    async fn authenticate(&self, _provider: ProviderKind) -> Result<AuthResponse> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.outcome {
            Outcome::Token(token) => Ok(AuthResponse {
                id_token: token.clone(),
                user_info: None,
            }),
            Outcome::Cancelled(reason) => Err(Error::AuthCancelled(reason.clone())),
            Outcome::ProviderError(message) => Err(Error::AuthProvider(message.clone())),
        }
    }
}
