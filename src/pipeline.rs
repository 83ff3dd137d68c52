//! Registration, posting and verification of anonymous messages.
//!
//! The pipeline owns no key material. It borrows the key manager for the
//! current key and the provider registry for proofs, and records the
//! resulting membership in the secret store.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::Clock;
use crate::crypto::EphemeralPublicKey;
use crate::error::{Error, Result};
use crate::keys::{EphemeralKey, EphemeralKeyManager};
use crate::message::{Message, SignedMessage, SignedMessageWithProof};
use crate::provider::{AnonGroup, ProofArgs, ProviderRegistry};
use crate::store::{SecretStore, StorageKey};
use crate::transport::{MembershipRecord, MessageTransport};

/// Store entries that together describe the registered identity.
const MEMBERSHIP_KEYS: [StorageKey; 3] = [
    StorageKey::CurrentMembership,
    StorageKey::CurrentGroupId,
    StorageKey::CurrentProvider,
];

/// The locally persisted result of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    pub provider: String,
    pub anon_group: AnonGroup,
    pub ephemeral_pubkey: EphemeralPublicKey,
    pub ephemeral_pubkey_expiry: u64,
    pub proof: String,
    /// Redacted copy, as published.
    pub proof_args: ProofArgs,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Registration {
    pub anon_group: AnonGroup,
    pub ephemeral_pubkey: EphemeralPublicKey,
    pub ephemeral_pubkey_expiry: u64,
}

/// Snapshot of the local identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// A valid key with a matching membership exists.
    pub registered: bool,
    pub provider: Option<String>,
    pub anon_group_id: Option<String>,
    pub ephemeral_pubkey: Option<EphemeralPublicKey>,
    /// Seconds until the current key expires; zero once expired.
    pub key_expires_in: Option<u64>,
}

pub struct MessageSigningPipeline {
    keys: Arc<EphemeralKeyManager>,
    providers: ProviderRegistry,
    transport: Arc<dyn MessageTransport>,
    store: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
}

impl MessageSigningPipeline {
    pub fn new(
        keys: Arc<EphemeralKeyManager>,
        providers: ProviderRegistry,
        transport: Arc<dyn MessageTransport>,
        store: Arc<dyn SecretStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            keys,
            providers,
            transport,
            store,
            clock,
        }
    }

    /// Sign in with `provider_name`, prove membership for a valid key and
    /// publish the membership.
    ///
    /// The membership is recorded locally before it is published. If
    /// either step fails the previous local records are put back. The key
    /// stays in place on failure and is reused by a retry while valid.
    pub async fn register_identity(&self, provider_name: &str) -> Result<Registration> {
        let provider = self.providers.get(provider_name)?;
        let key = self.keys.ensure_valid().await?;

        provider.authenticate().await?;
        let proof = provider.generate_proof(&key).await?;
        let public_args = proof.proof_args.redacted();

        let membership = Membership {
            provider: provider.name().to_string(),
            anon_group: proof.anon_group.clone(),
            ephemeral_pubkey: *key.public_key(),
            ephemeral_pubkey_expiry: key.expiry(),
            proof: proof.proof,
            proof_args: public_args,
        };
        let record = MembershipRecord {
            ephemeral_pubkey: membership.ephemeral_pubkey,
            ephemeral_pubkey_expiry: membership.ephemeral_pubkey_expiry,
            group_id: membership.anon_group.id.clone(),
            provider: membership.provider.clone(),
            proof: membership.proof.clone(),
            proof_args: membership.proof_args.clone(),
        };

        let previous = self.read_membership_entries().await?;
        let published = async {
            self.write_membership(&membership).await?;
            self.transport.submit_membership(&record).await
        };
        if let Err(e) = published.await {
            warn!(provider = provider.name(), error = %e, "Registration failed, restoring previous membership");
            if let Err(restore) = self.write_membership_entries(&previous).await {
                warn!(error = %restore, "Previous membership could not be restored");
            }
            return Err(e);
        }
        info!(
            provider = provider.name(),
            group = %record.group_id,
            pubkey = %key.public_key().short(),
            "Membership submitted"
        );

        Ok(Registration {
            anon_group: proof.anon_group,
            ephemeral_pubkey: *key.public_key(),
            ephemeral_pubkey_expiry: key.expiry(),
        })
    }

    async fn write_membership(&self, membership: &Membership) -> Result<()> {
        self.write_membership_entries(&[
            Some(serde_json::to_string(membership)?),
            Some(membership.anon_group.id.clone()),
            Some(membership.provider.clone()),
        ])
        .await
    }

    async fn read_membership_entries(&self) -> Result<[Option<String>; 3]> {
        let mut entries: [Option<String>; 3] = Default::default();
        for (entry, key) in entries.iter_mut().zip(MEMBERSHIP_KEYS) {
            *entry = self.store.get(&key.as_string()).await?;
        }
        Ok(entries)
    }

    /// Set each membership entry, deleting those given as `None`.
    async fn write_membership_entries(&self, entries: &[Option<String>; 3]) -> Result<()> {
        for (key, value) in MEMBERSHIP_KEYS.iter().zip(entries) {
            match value {
                Some(value) => self.store.set(&key.as_string(), value).await?,
                None => self.store.delete(&key.as_string()).await?,
            }
        }
        Ok(())
    }

    pub async fn current_membership(&self) -> Result<Option<Membership>> {
        match self.store.get(&StorageKey::CurrentMembership.as_string()).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// The current key and its membership, if the key is still valid and
    /// was the one registered.
    async fn identity(&self) -> Result<(EphemeralKey, Membership)> {
        let key = self
            .keys
            .current()
            .await?
            .filter(|k| self.keys.is_valid(k))
            .ok_or(Error::NoIdentity)?;
        let membership = self
            .current_membership()
            .await?
            .filter(|m| m.ephemeral_pubkey == *key.public_key())
            .ok_or(Error::NoIdentity)?;
        Ok((key, membership))
    }

    /// Sign `text` with the current key and submit it.
    ///
    /// Fails with [`Error::NoIdentity`] when there is no valid registered
    /// key. Any later failure is returned as [`Error::MessageNotSent`]
    /// carrying `text`.
    pub async fn post_message(&self, text: &str, internal: bool) -> Result<SignedMessageWithProof> {
        // The key captured here is the one attached to the message, even if
        // a rotation happens while the post is in flight.
        let (key, membership) = match self.identity().await {
            Ok(identity) => identity,
            Err(Error::NoIdentity) => return Err(Error::NoIdentity),
            Err(e) => return Err(not_sent(text, e)),
        };

        let message = Message {
            id: Uuid::new_v4().to_string(),
            anon_group_id: membership.anon_group.id.clone(),
            anon_group_provider: membership.provider.clone(),
            text: text.to_string(),
            timestamp: self.clock.now(),
            internal,
            likes: 0,
        };
        let body = message.canonical_bytes().map_err(|e| not_sent(text, e))?;
        let signed = SignedMessage {
            signature: key.sign(&body),
            message,
            ephemeral_pubkey: *key.public_key(),
            ephemeral_pubkey_expiry: key.expiry(),
        };

        self.transport
            .submit_message(&signed)
            .await
            .map_err(|e| not_sent(text, e))?;
        info!(
            id = %signed.message.id,
            group = %signed.message.anon_group_id,
            internal,
            pubkey = %key.public_key().short(),
            "Message posted"
        );

        Ok(SignedMessageWithProof {
            signed,
            proof: membership.proof,
            proof_args: membership.proof_args,
        })
    }

    /// Signature over the content fields, then the sender's membership
    /// proof and key expiry. Both must pass.
    pub async fn verify_incoming_message(&self, message: &SignedMessageWithProof) -> bool {
        let signed = &message.signed;
        if !signed.signature_valid() {
            debug!(id = %signed.message.id, "Message rejected: bad signature");
            return false;
        }

        let provider = match self.providers.get(&signed.message.anon_group_provider) {
            Ok(provider) => provider,
            Err(e) => {
                debug!(id = %signed.message.id, error = %e, "Message rejected");
                return false;
            }
        };

        let valid = provider
            .verify_proof(
                &message.proof,
                &signed.message.anon_group_id,
                &signed.ephemeral_pubkey,
                signed.ephemeral_pubkey_expiry,
                &message.proof_args,
            )
            .await;
        debug!(id = %signed.message.id, valid, "Message verified");
        valid
    }

    /// Fetch the feed and keep only messages that verify.
    pub async fn fetch_verified(&self, internal: bool) -> Result<Vec<SignedMessageWithProof>> {
        let fetched = self.transport.fetch_messages(internal).await?;
        let total = fetched.len();
        let mut verified = Vec::with_capacity(total);
        for message in fetched {
            if self.verify_incoming_message(&message).await {
                verified.push(message);
            }
        }
        if verified.len() < total {
            warn!(dropped = total - verified.len(), total, "Dropped unverifiable messages");
        }
        Ok(verified)
    }

    /// Clear the key, the membership and every provider session.
    pub async fn sign_out(&self) -> Result<()> {
        self.keys.clear().await?;
        self.write_membership_entries(&Default::default()).await?;
        for provider in self.providers.iter() {
            provider.sign_out().await?;
        }
        info!("Identity cleared");
        Ok(())
    }

    pub async fn status(&self) -> Result<Status> {
        let key = self.keys.current().await?;
        let membership = self.current_membership().await?;
        let registered = match (&key, &membership) {
            (Some(k), Some(m)) => self.keys.is_valid(k) && m.ephemeral_pubkey == *k.public_key(),
            _ => false,
        };
        Ok(Status {
            registered,
            provider: self.store.get(&StorageKey::CurrentProvider.as_string()).await?,
            anon_group_id: self.store.get(&StorageKey::CurrentGroupId.as_string()).await?,
            ephemeral_pubkey: key.as_ref().map(|k| *k.public_key()),
            key_expires_in: key.as_ref().map(|k| self.keys.time_until_expiry(k)),
        })
    }
}

fn not_sent(text: &str, source: Error) -> Error {
    warn!(error = %source, "Message not sent");
    Error::MessageNotSent {
        text: text.to_string(),
        source: Box::new(source),
    }
}
