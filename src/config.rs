//! Runtime configuration.
//!
//! Loaded once at startup from JSON, optionally overridden by `NYMPH_*`
//! environment variables, and handed to [`crate::NymphContext`].

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::jwt::Jwk;

/// Default ephemeral key lifetime (24 hours).
pub const DEFAULT_KEY_TTL_SECS: u64 = 24 * 60 * 60;

/// Default bound on an interactive sign-in (5 minutes).
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 300;

/// Personal mailbox providers that never identify an organization.
pub const DEFAULT_CONSUMER_DOMAINS: &[&str] = &[
    "gmail.com",
    "googlemail.com",
    "outlook.com",
    "hotmail.com",
    "live.com",
    "msn.com",
    "yahoo.com",
    "icloud.com",
];

/// OAuth client settings for one identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    /// Accepted `iss` claim prefixes.
    pub issuers: Vec<String>,
    /// RS256 keys used to check token signatures and fill circuit limbs.
    pub signing_keys: Vec<Jwk>,
}

impl OAuthClientConfig {
    pub fn google() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: "http://localhost:8081/oauth/google".to_string(),
            scopes: vec!["openid".into(), "email".into(), "profile".into()],
            issuers: vec![
                "https://accounts.google.com".into(),
                "accounts.google.com".into(),
            ],
            signing_keys: Vec::new(),
        }
    }

    pub fn microsoft() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: "http://localhost:8081/oauth/microsoft".to_string(),
            scopes: vec![
                "openid".into(),
                "email".into(),
                "profile".into(),
                "User.Read".into(),
            ],
            issuers: vec!["https://login.microsoftonline.com/".into()],
            signing_keys: Vec::new(),
        }
    }
}

impl Default for OAuthClientConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: String::new(),
            scopes: Vec::new(),
            issuers: Vec::new(),
            signing_keys: Vec::new(),
        }
    }
}

/// Which identities count as organizational.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DomainPolicy {
    /// Reject tokens that assert `email_verified: false`. Tokens without the
    /// claim (Entra ID access tokens, for one) are accepted.
    pub require_verified_email: bool,
    /// Domains rejected as non-organizational.
    pub consumer_domains: Vec<String>,
}

impl Default for DomainPolicy {
    fn default() -> Self {
        Self {
            require_verified_email: true,
            consumer_domains: DEFAULT_CONSUMER_DOMAINS
                .iter()
                .map(|d| d.to_string())
                .collect(),
        }
    }
}

impl DomainPolicy {
    /// Whether `domain` is on the consumer deny-list (case-insensitive).
    pub fn is_consumer_domain(&self, domain: &str) -> bool {
        self.consumer_domains
            .iter()
            .any(|d| d.eq_ignore_ascii_case(domain))
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NymphConfig {
    /// Ephemeral key lifetime in seconds.
    pub key_ttl_secs: u64,
    /// Upper bound on an interactive authentication, in seconds.
    pub auth_timeout_secs: u64,
    #[serde(flatten)]
    pub policy: DomainPolicy,
    pub google: OAuthClientConfig,
    pub microsoft: OAuthClientConfig,
}

impl Default for NymphConfig {
    fn default() -> Self {
        Self {
            key_ttl_secs: DEFAULT_KEY_TTL_SECS,
            auth_timeout_secs: DEFAULT_AUTH_TIMEOUT_SECS,
            policy: DomainPolicy::default(),
            google: OAuthClientConfig::google(),
            microsoft: OAuthClientConfig::microsoft(),
        }
    }
}

impl NymphConfig {
    /// Parse from JSON; absent fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Override fields from `NYMPH_*` environment variables.
    pub fn apply_env(mut self) -> Result<Self> {
        self.apply_vars(|name| std::env::var(name).ok())?;
        self.validate()?;
        Ok(self)
    }

    fn apply_vars(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = var("NYMPH_KEY_TTL_SECS") {
            self.key_ttl_secs = parse_secs("NYMPH_KEY_TTL_SECS", &v)?;
        }
        if let Some(v) = var("NYMPH_AUTH_TIMEOUT_SECS") {
            self.auth_timeout_secs = parse_secs("NYMPH_AUTH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = var("NYMPH_GOOGLE_CLIENT_ID") {
            self.google.client_id = v;
        }
        if let Some(v) = var("NYMPH_GOOGLE_REDIRECT_URI") {
            self.google.redirect_uri = v;
        }
        if let Some(v) = var("NYMPH_MICROSOFT_CLIENT_ID") {
            self.microsoft.client_id = v;
        }
        if let Some(v) = var("NYMPH_MICROSOFT_REDIRECT_URI") {
            self.microsoft.redirect_uri = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_ttl_secs == 0 {
            return Err(Error::Config("key_ttl_secs must be positive".into()));
        }
        if self.auth_timeout_secs == 0 {
            return Err(Error::Config("auth_timeout_secs must be positive".into()));
        }
        Ok(())
    }
}

fn parse_secs(name: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} is not a number of seconds: {}", name, value)))
}
