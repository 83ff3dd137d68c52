//! Feed messages and their signed forms.
//!
//! The signature covers a canonical `bincode` encoding of the content
//! fields only: id, group, provider, text, timestamp and the internal flag.
//! Signature, key, proof and the server-mutable like count stay outside it.

use serde::{Deserialize, Serialize};

use crate::crypto::{EphemeralPublicKey, EphemeralSignature};
use crate::error::{Error, Result};
use crate::provider::ProofArgs;

const BODY_TAG: &str = "nymph/message/v1";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub anon_group_id: String,
    /// Name of the provider that vouches for the group.
    pub anon_group_provider: String,
    pub text: String,
    /// Unix seconds.
    pub timestamp: u64,
    /// Visible only inside the group.
    pub internal: bool,
    #[serde(default)]
    pub likes: u64,
}

#[derive(Serialize)]
struct CanonicalBody<'a> {
    tag: &'static str,
    id: &'a str,
    anon_group_id: &'a str,
    anon_group_provider: &'a str,
    text: &'a str,
    timestamp: u64,
    internal: bool,
}

impl Message {
    /// Bytes the ephemeral key signs.
    pub fn canonical_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(&CanonicalBody {
            tag: BODY_TAG,
            id: &self.id,
            anon_group_id: &self.anon_group_id,
            anon_group_provider: &self.anon_group_provider,
            text: &self.text,
            timestamp: self.timestamp,
            internal: self.internal,
        })
        .map_err(|e| Error::Encoding(format!("message body: {}", e)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessage {
    #[serde(flatten)]
    pub message: Message,
    pub signature: EphemeralSignature,
    pub ephemeral_pubkey: EphemeralPublicKey,
    pub ephemeral_pubkey_expiry: u64,
}

impl SignedMessage {
    /// Whether the signature matches the content under the attached key.
    pub fn signature_valid(&self) -> bool {
        match self.message.canonical_bytes() {
            Ok(body) => self.ephemeral_pubkey.verify(&body, &self.signature),
            Err(_) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedMessageWithProof {
    #[serde(flatten)]
    pub signed: SignedMessage,
    pub proof: String,
    pub proof_args: ProofArgs,
}
