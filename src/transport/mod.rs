//! Message transport port.

mod memory;

pub use memory::InMemoryTransport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::EphemeralPublicKey;
use crate::error::Result;
use crate::message::{SignedMessage, SignedMessageWithProof};
use crate::provider::ProofArgs;

/// Registration of an ephemeral key as a member of a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MembershipRecord {
    pub ephemeral_pubkey: EphemeralPublicKey,
    pub ephemeral_pubkey_expiry: u64,
    pub group_id: String,
    pub provider: String,
    pub proof: String,
    /// Redacted: never carries the email address.
    pub proof_args: ProofArgs,
}

/// Remote feed. Failures surface as [`crate::Error::Transport`].
#[async_trait]
pub trait MessageTransport: Send + Sync {
    async fn submit_membership(&self, record: &MembershipRecord) -> Result<()>;

    async fn submit_message(&self, message: &SignedMessage) -> Result<()>;

    /// Messages with their sender's membership proof attached.
    async fn fetch_messages(&self, internal: bool) -> Result<Vec<SignedMessageWithProof>>;
}
