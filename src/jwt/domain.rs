//! Organization domain derivation from identity claims.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::Claims;
use crate::config::{DomainPolicy, NymphConfig};
use crate::error::{Error, Result};

/// Widest domain the membership circuit accepts, in UTF-8 bytes.
pub const MAX_DOMAIN_LEN: usize = 64;

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"))
}

fn domain_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[\p{L}\p{N}.-]+$").expect("domain pattern compiles"))
}

/// Identity provider families with distinct claim precedence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Google,
    Microsoft,
}

impl ProviderKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Google => "google",
            ProviderKind::Microsoft => "microsoft",
        }
    }

    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "google" => Ok(ProviderKind::Google),
            "microsoft" => Ok(ProviderKind::Microsoft),
            other => Err(Error::UnknownProvider(other.to_string())),
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A normalized domain and the address it came from, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedDomain {
    pub domain: String,
    pub email: Option<String>,
}

/// Applies provider precedence and organizational policy to claims.
#[derive(Debug, Clone)]
pub struct DomainExtractor {
    policy: DomainPolicy,
}

impl DomainExtractor {
    /// An extractor with no consumer deny-list.
    pub fn new(require_verified_email: bool) -> Self {
        Self {
            policy: DomainPolicy {
                require_verified_email,
                consumer_domains: Vec::new(),
            },
        }
    }

    pub fn from_config(config: &NymphConfig) -> Self {
        Self::with_policy(config.policy.clone())
    }

    pub fn with_policy(policy: DomainPolicy) -> Self {
        Self { policy }
    }

    pub fn with_consumer_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.policy.consumer_domains = domains.into_iter().map(|d| d.as_ref().to_string()).collect();
        self
    }

    pub fn parse_claims(&self, token: &str) -> Result<Claims> {
        super::parse_claims(token)
    }

    /// The normalized organization domain asserted by `claims`.
    pub fn extract_domain(&self, claims: &Claims, provider: ProviderKind) -> Result<String> {
        self.extract(claims, provider).map(|e| e.domain)
    }

    /// Like [`Self::extract_domain`], keeping the source address.
    ///
    /// Google prefers `hd` over the email's domain part. Microsoft prefers
    /// `upn`, then `email`, then `preferred_username`.
    pub fn extract(&self, claims: &Claims, provider: ProviderKind) -> Result<ExtractedDomain> {
        if self.policy.require_verified_email && claims.email_verified == Some(false) {
            return Err(Error::EmailVerification);
        }

        let extracted = match provider {
            ProviderKind::Google => match claims.hd.as_deref().filter(|hd| !hd.trim().is_empty()) {
                Some(hd) => ExtractedDomain {
                    domain: hd.to_string(),
                    email: claims.email.clone(),
                },
                None => from_address(claims.email.as_deref().ok_or(Error::NoDomain)?)?,
            },
            ProviderKind::Microsoft => {
                let address = claims
                    .upn
                    .as_deref()
                    .or(claims.email.as_deref())
                    .or(claims.preferred_username.as_deref())
                    .ok_or(Error::NoDomain)?;
                from_address(address)?
            }
        };

        let domain = normalize_domain(&extracted.domain)?;
        if self.policy.is_consumer_domain(&domain) {
            return Err(Error::OrgPolicyViolation(format!(
                "{} is a personal email provider, not an organization",
                domain
            )));
        }

        Ok(ExtractedDomain {
            domain,
            email: extracted.email,
        })
    }
}

fn from_address(address: &str) -> Result<ExtractedDomain> {
    let address = address.trim();
    if !email_pattern().is_match(address) {
        return Err(Error::InvalidDomain("identity claim is not an email address".to_string()));
    }
    let domain = address.rsplit('@').next().ok_or(Error::NoDomain)?;
    Ok(ExtractedDomain {
        domain: domain.to_string(),
        email: Some(address.to_string()),
    })
}

/// Lowercase, then check length (bytes) and character set.
pub fn normalize_domain(domain: &str) -> Result<String> {
    let domain = domain.trim().to_lowercase();
    if domain.is_empty() {
        return Err(Error::NoDomain);
    }
    if domain.len() > MAX_DOMAIN_LEN {
        return Err(Error::DomainTooLong {
            len: domain.len(),
            max: MAX_DOMAIN_LEN,
        });
    }
    if !domain_pattern().is_match(&domain) {
        return Err(Error::InvalidDomain(format!("{} contains unsupported characters", domain)));
    }
    Ok(domain)
}

/// Zero-pad `domain` to `max_len` bytes. Longer domains are rejected.
pub fn to_fixed_width_bytes(domain: &str, max_len: usize) -> Result<Vec<u8>> {
    let bytes = domain.as_bytes();
    if bytes.len() > max_len {
        return Err(Error::DomainTooLong {
            len: bytes.len(),
            max: max_len,
        });
    }
    let mut out = vec![0u8; max_len];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::testing::token;
    use serde_json::json;

    fn claims(value: serde_json::Value) -> Claims {
        crate::jwt::parse_claims(&token(value)).unwrap()
    }

    fn extractor() -> DomainExtractor {
        DomainExtractor::from_config(&NymphConfig::default())
    }

    #[test]
    fn test_google_prefers_hosted_domain() {
        let c = claims(json!({ "hd": "acme.com", "email": "a@other.org", "email_verified": true }));
        assert_eq!(extractor().extract_domain(&c, ProviderKind::Google).unwrap(), "acme.com");
    }

    #[test]
    fn test_google_falls_back_to_email() {
        let c = claims(json!({ "email": "a@acme.com", "email_verified": true }));
        let extracted = extractor().extract(&c, ProviderKind::Google).unwrap();
        assert_eq!(extracted.domain, "acme.com");
        assert_eq!(extracted.email.as_deref(), Some("a@acme.com"));
    }

    #[test]
    fn test_unverified_email_rejected() {
        let c = claims(json!({ "hd": "acme.com", "email_verified": false }));
        assert!(matches!(
            extractor().extract_domain(&c, ProviderKind::Google),
            Err(Error::EmailVerification)
        ));

        let lenient = DomainExtractor::new(false);
        assert_eq!(lenient.extract_domain(&c, ProviderKind::Google).unwrap(), "acme.com");
    }

    #[test]
    fn test_missing_verification_claim_accepted() {
        // Entra ID tokens carry no `email_verified` at all.
        let c = claims(json!({ "upn": "bob@contoso.com", "tid": "9188040d" }));
        assert_eq!(extractor().extract_domain(&c, ProviderKind::Microsoft).unwrap(), "contoso.com");

        let c = claims(json!({ "email": "a@acme.com" }));
        assert_eq!(extractor().extract_domain(&c, ProviderKind::Google).unwrap(), "acme.com");
    }

    #[test]
    fn test_microsoft_precedence() {
        let c = claims(json!({
            "upn": "bob@contoso.com",
            "email": "bob@fabrikam.com",
            "email_verified": true
        }));
        assert_eq!(extractor().extract_domain(&c, ProviderKind::Microsoft).unwrap(), "contoso.com");

        let c = claims(json!({ "preferred_username": "bob@Contoso.COM", "email_verified": true }));
        assert_eq!(extractor().extract_domain(&c, ProviderKind::Microsoft).unwrap(), "contoso.com");
    }

    #[test]
    fn test_no_domain() {
        let c = claims(json!({ "email_verified": true, "sub": "1" }));
        assert!(matches!(extractor().extract_domain(&c, ProviderKind::Google), Err(Error::NoDomain)));
        assert!(matches!(extractor().extract_domain(&c, ProviderKind::Microsoft), Err(Error::NoDomain)));
    }

    #[test]
    fn test_consumer_domain_rejected() {
        let c = claims(json!({ "email": "someone@Gmail.com", "email_verified": true }));
        assert!(matches!(
            extractor().extract_domain(&c, ProviderKind::Google),
            Err(Error::OrgPolicyViolation(_))
        ));
    }

    #[test]
    fn test_length_boundary_in_bytes() {
        let ok = format!("{}.com", "a".repeat(60));
        assert_eq!(ok.len(), 64);
        assert_eq!(normalize_domain(&ok).unwrap(), ok);

        let long = format!("{}.com", "a".repeat(61));
        assert!(matches!(normalize_domain(&long), Err(Error::DomainTooLong { len: 65, max: 64 })));

        // 30 two-byte characters: 30 chars but 64 bytes with the suffix.
        let wide = format!("{}.com", "é".repeat(30));
        assert_eq!(wide.len(), 64);
        assert!(normalize_domain(&wide).is_ok());
        let wider = format!("{}.com", "é".repeat(31));
        assert!(matches!(normalize_domain(&wider), Err(Error::DomainTooLong { .. })));
    }

    #[test]
    fn test_invalid_characters() {
        assert!(matches!(normalize_domain("acme.com/evil"), Err(Error::InvalidDomain(_))));
        assert!(matches!(normalize_domain("ac me.com"), Err(Error::InvalidDomain(_))));
        assert_eq!(normalize_domain("Bücher.de").unwrap(), "bücher.de");
    }

    #[test]
    fn test_malformed_email_claim() {
        let c = claims(json!({ "email": "not-an-address", "email_verified": true }));
        assert!(matches!(
            extractor().extract_domain(&c, ProviderKind::Google),
            Err(Error::InvalidDomain(_))
        ));
    }

    #[test]
    fn test_fixed_width_bytes() {
        let padded = to_fixed_width_bytes("acme.com", MAX_DOMAIN_LEN).unwrap();
        assert_eq!(padded.len(), 64);
        assert_eq!(&padded[..8], b"acme.com");
        assert!(padded[8..].iter().all(|b| *b == 0));

        assert!(matches!(
            to_fixed_width_bytes("abcdef", 5),
            Err(Error::DomainTooLong { len: 6, max: 5 })
        ));
    }

    #[test]
    fn test_provider_names() {
        assert_eq!(ProviderKind::from_name("google").unwrap(), ProviderKind::Google);
        assert!(matches!(ProviderKind::from_name("github"), Err(Error::UnknownProvider(_))));
    }
}
