//! Compact identity tokens (JWT).
//!
//! Parsing here is structural only. Signature checks live in [`signing`],
//! organization domain derivation in [`domain`].

pub mod domain;
pub mod signing;

pub use domain::{
    normalize_domain, to_fixed_width_bytes, DomainExtractor, ExtractedDomain, ProviderKind, MAX_DOMAIN_LEN,
};
pub use signing::{Jwk, JwtSigningKey};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::error::{Error, Result};

/// Decode one base64url token segment, tolerating trailing padding.
pub fn decode_segment(segment: &str) -> Result<Vec<u8>> {
    URL_SAFE_NO_PAD
        .decode(segment.trim_end_matches('='))
        .map_err(|e| Error::MalformedToken(format!("segment is not base64url: {}", e)))
}

/// JOSE header fields we look at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    #[serde(default)]
    pub alg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typ: Option<String>,
}

/// Identity claims used by the membership workflow. Unknown claims are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub email: Option<String>,
    /// Some issuers send this as the string `"true"`.
    #[serde(default, deserialize_with = "bool_or_string")]
    pub email_verified: Option<bool>,
    /// Google hosted domain.
    pub hd: Option<String>,
    /// Microsoft user principal name.
    pub upn: Option<String>,
    pub preferred_username: Option<String>,
    /// Microsoft tenant id.
    pub tid: Option<String>,
    pub name: Option<String>,
    pub iss: Option<String>,
    pub sub: Option<String>,
    pub aud: Option<serde_json::Value>,
    pub exp: Option<u64>,
    pub iat: Option<u64>,
}

impl Claims {
    /// True unless the token carries an `exp` at or before `now`.
    pub fn is_live(&self, now: u64) -> bool {
        self.exp.map_or(true, |exp| now < exp)
    }
}

fn bool_or_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Option<bool>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
    }

    match Option::<Flag>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Flag::Bool(b)) => Ok(Some(b)),
        Some(Flag::Text(s)) => match s.as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            other => Err(de::Error::custom(format!("email_verified is not a boolean: {}", other))),
        },
    }
}

/// Parse the claims of a compact token without checking its signature.
pub fn parse_claims(token: &str) -> Result<Claims> {
    IdentityToken::parse(token).map(|t| t.claims)
}

/// A structurally valid compact JWT and its decoded parts.
#[derive(Clone)]
pub struct IdentityToken {
    raw: String,
    header: Header,
    claims: Claims,
}

impl IdentityToken {
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let parts: Vec<&str> = raw.split('.').collect();
        if parts.len() != 3 {
            return Err(Error::MalformedToken(format!(
                "expected 3 dot-separated segments, found {}",
                parts.len()
            )));
        }

        let header: Header = serde_json::from_slice(&decode_segment(parts[0])?)
            .map_err(|e| Error::MalformedToken(format!("header: {}", e)))?;
        let claims: Claims = serde_json::from_slice(&decode_segment(parts[1])?)
            .map_err(|e| Error::MalformedToken(format!("payload: {}", e)))?;

        Ok(Self {
            raw: raw.to_string(),
            header,
            claims,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn claims(&self) -> &Claims {
        &self.claims
    }

    /// `header.payload`, the bytes covered by the signature.
    pub fn signed_part(&self) -> &str {
        match self.raw.rfind('.') {
            Some(i) => &self.raw[..i],
            None => &self.raw,
        }
    }

    /// Length of the encoded header, i.e. the offset of the first `.`.
    pub fn header_len(&self) -> usize {
        self.raw.find('.').unwrap_or(0)
    }

    pub fn signature(&self) -> Result<Vec<u8>> {
        let encoded = self.raw.rsplit('.').next().unwrap_or_default();
        decode_segment(encoded)
    }
}

impl std::fmt::Debug for IdentityToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityToken")
            .field("alg", &self.header.alg)
            .field("iss", &self.claims.iss)
            .field("exp", &self.claims.exp)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Token builders shared by unit tests.

    use super::*;

    pub fn encode(value: &serde_json::Value) -> String {
        URL_SAFE_NO_PAD.encode(value.to_string())
    }

    /// An unsigned RS256-shaped token with a placeholder signature.
    pub fn token(claims: serde_json::Value) -> String {
        let header = serde_json::json!({ "alg": "RS256", "typ": "JWT" });
        format!("{}.{}.{}", encode(&header), encode(&claims), URL_SAFE_NO_PAD.encode(b"sig"))
    }

    /// A live Google-shaped token for `email`.
    pub fn google_token(email: &str, hd: Option<&str>, exp: u64) -> String {
        let mut claims = serde_json::json!({
            "iss": "https://accounts.google.com",
            "email": email,
            "email_verified": true,
            "sub": "1234567890",
            "exp": exp,
        });
        if let Some(hd) = hd {
            claims["hd"] = serde_json::Value::String(hd.to_string());
        }
        token(claims)
    }
}
