//! RS256 identity-token signatures and their circuit limb encoding.
//!
//! Big integers are split into [`LIMB_COUNT`] little-endian limbs of
//! [`LIMB_BITS`] bits each, the layout the JWT circuit expects for a
//! 2048-bit modulus, its Barrett parameter, and the signature.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use super::{decode_segment, IdentityToken};
use crate::error::{Error, Result};

pub const LIMB_BITS: usize = 120;
pub const LIMB_COUNT: usize = 18;

const LIMB_BYTES: usize = LIMB_BITS / 8;

/// Limb encoding of one big integer.
pub type Limbs = [u128; LIMB_COUNT];

/// A JSON Web Key holding an RSA public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kid: Option<String>,
    /// Modulus, base64url big-endian.
    pub n: String,
    /// Public exponent, base64url big-endian.
    pub e: String,
}

/// An issuer's RS256 verification key.
#[derive(Clone)]
pub struct JwtSigningKey {
    kid: Option<String>,
    key: RsaPublicKey,
}

impl JwtSigningKey {
    pub fn new(key: RsaPublicKey, kid: Option<String>) -> Self {
        Self { kid, key }
    }

    pub fn from_jwk(jwk: &Jwk) -> Result<Self> {
        let n = BigUint::from_bytes_be(&decode_jwk_field(&jwk.n, "n")?);
        let e = BigUint::from_bytes_be(&decode_jwk_field(&jwk.e, "e")?);
        let key = RsaPublicKey::new(n, e).map_err(|e| Error::Config(format!("invalid RSA key: {}", e)))?;
        Ok(Self::new(key, jwk.kid.clone()))
    }

    pub fn to_jwk(&self) -> Jwk {
        Jwk {
            kid: self.kid.clone(),
            n: URL_SAFE_NO_PAD.encode(self.key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(self.key.e().to_bytes_be()),
        }
    }

    pub fn kid(&self) -> Option<&str> {
        self.kid.as_deref()
    }

    /// Check the token's RS256 signature over `header.payload`.
    pub fn verify(&self, token: &IdentityToken) -> Result<()> {
        if token.header().alg != "RS256" {
            return Err(Error::InvalidTokenSignature(format!(
                "unsupported algorithm {:?}",
                token.header().alg
            )));
        }
        let signature = Signature::try_from(token.signature()?.as_slice())
            .map_err(|e| Error::InvalidTokenSignature(e.to_string()))?;
        VerifyingKey::<Sha256>::new(self.key.clone())
            .verify(token.signed_part().as_bytes(), &signature)
            .map_err(|_| Error::InvalidTokenSignature("signature does not match key".to_string()))
    }

    pub fn modulus_limbs(&self) -> Result<Limbs> {
        to_limbs(self.key.n(), "jwt_pubkey_modulus_limbs")
    }

    /// Barrett parameter `floor(2^(2k + 4) / n)` for a `k`-bit modulus.
    pub fn redc_limbs(&self) -> Result<Limbs> {
        let n = self.key.n();
        let shift = 2 * n.bits() + 4;
        let redc = (BigUint::from(1u32) << shift) / n;
        to_limbs(&redc, "jwt_pubkey_redc_params_limbs")
    }
}

impl std::fmt::Debug for JwtSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSigningKey")
            .field("kid", &self.kid)
            .field("bits", &self.key.n().bits())
            .finish()
    }
}

fn decode_jwk_field(value: &str, name: &str) -> Result<Vec<u8>> {
    decode_segment(value).map_err(|_| Error::Config(format!("JWK field {} is not base64url", name)))
}

/// Limbs of the token signature.
pub fn signature_limbs(token: &IdentityToken) -> Result<Limbs> {
    to_limbs(&BigUint::from_bytes_be(&token.signature()?), "jwt_signature_limbs")
}

/// Split `value` into little-endian limbs, rejecting values that do not fit.
pub fn to_limbs(value: &BigUint, field: &'static str) -> Result<Limbs> {
    let bytes = value.to_bytes_le();
    let max = LIMB_COUNT * LIMB_BYTES;
    if bytes.len() > max {
        return Err(Error::CircuitInputOverflow {
            field,
            len: bytes.len(),
            max,
        });
    }

    let mut limbs = [0u128; LIMB_COUNT];
    for (limb, chunk) in limbs.iter_mut().zip(bytes.chunks(LIMB_BYTES)) {
        let mut buf = [0u8; 16];
        buf[..chunk.len()].copy_from_slice(chunk);
        *limb = u128::from_le_bytes(buf);
    }
    Ok(limbs)
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use serde_json::json;

    #[test]
    fn test_verify_signed_token() {
        let private = issuer_key(1);
        let key = JwtSigningKey::new(private.to_public_key(), Some("k1".into()));
        let raw = signed_token(&private, "k1", json!({ "email": "a@acme.com" }));
        let token = IdentityToken::parse(&raw).unwrap();
        key.verify(&token).unwrap();
    }

    #[test]
    fn test_tampered_payload_rejected() {
        let private = issuer_key(1);
        let key = JwtSigningKey::new(private.to_public_key(), None);
        let raw = signed_token(&private, "k1", json!({ "email": "a@acme.com" }));
        let forged = signed_token(&private, "k1", json!({ "email": "a@evil.com" }));

        let mut parts: Vec<&str> = raw.split('.').collect();
        parts[1] = forged.split('.').nth(1).unwrap();
        let token = IdentityToken::parse(&parts.join(".")).unwrap();
        assert!(matches!(key.verify(&token), Err(Error::InvalidTokenSignature(_))));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let raw = signed_token(&issuer_key(1), "k1", json!({ "sub": "1" }));
        let other = JwtSigningKey::new(issuer_key(2).to_public_key(), None);
        assert!(other.verify(&IdentityToken::parse(&raw).unwrap()).is_err());
    }

    #[test]
    fn test_jwk_round_trip() {
        let key = JwtSigningKey::new(issuer_key(3).to_public_key(), Some("k3".into()));
        let jwk = key.to_jwk();
        assert_eq!(jwk.e, "AQAB");
        let back = JwtSigningKey::from_jwk(&jwk).unwrap();
        assert_eq!(back.modulus_limbs().unwrap(), key.modulus_limbs().unwrap());
        assert_eq!(back.kid(), Some("k3"));
    }

    #[test]
    fn test_limbs_layout() {
        let value = (BigUint::from(1u32) << 120) + BigUint::from(5u32);
        let limbs = to_limbs(&value, "test").unwrap();
        assert_eq!(limbs[0], 5);
        assert_eq!(limbs[1], 1);
        assert!(limbs[2..].iter().all(|l| *l == 0));

        let too_big = BigUint::from(1u32) << (LIMB_BITS * LIMB_COUNT);
        assert!(matches!(
            to_limbs(&too_big, "test"),
            Err(Error::CircuitInputOverflow { field: "test", .. })
        ));
    }

    #[test]
    fn test_redc_parameter() {
        let key = JwtSigningKey::new(issuer_key(4).to_public_key(), None);
        let redc = key.redc_limbs().unwrap();
        let modulus = key.modulus_limbs().unwrap();
        assert!(redc.iter().any(|l| *l != 0));
        assert!(modulus.iter().all(|l| *l < (1u128 << LIMB_BITS)));
    }
}
