use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{MembershipRecord, MessageTransport};
use crate::crypto::EphemeralPublicKey;
use crate::error::{Error, Result};
use crate::message::{SignedMessage, SignedMessageWithProof};

#[derive(Default)]
struct Feed {
    memberships: HashMap<EphemeralPublicKey, MembershipRecord>,
    messages: Vec<SignedMessage>,
}

/// In-process feed that behaves like the relay server: messages are only
/// accepted from registered keys, and fetched messages carry the sender's
/// membership proof.
#[derive(Default)]
pub struct InMemoryTransport {
    feed: Mutex<Feed>,
    offline: AtomicBool,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with a transport error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub async fn memberships(&self) -> Vec<MembershipRecord> {
        self.feed.lock().await.memberships.values().cloned().collect()
    }

    /// Replace a stored message in place, as a malicious relay could.
    pub async fn rewrite_messages(&self, edit: impl Fn(&mut SignedMessage)) {
        let mut feed = self.feed.lock().await;
        feed.messages.iter_mut().for_each(edit);
    }

    fn check(&self) -> Result<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Transport("transport offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageTransport for InMemoryTransport {
    async fn submit_membership(&self, record: &MembershipRecord) -> Result<()> {
        self.check()?;
        self.feed
            .lock()
            .await
            .memberships
            .insert(record.ephemeral_pubkey, record.clone());
        Ok(())
    }

    async fn submit_message(&self, message: &SignedMessage) -> Result<()> {
        self.check()?;
        let mut feed = self.feed.lock().await;
        match feed.memberships.get(&message.ephemeral_pubkey) {
            Some(m) if m.group_id == message.message.anon_group_id => {}
            Some(_) => return Err(Error::Transport("key is registered to another group".to_string())),
            None => return Err(Error::Transport("unregistered ephemeral key".to_string())),
        }
        feed.messages.push(message.clone());
        Ok(())
    }

    async fn fetch_messages(&self, internal: bool) -> Result<Vec<SignedMessageWithProof>> {
        self.check()?;
        let feed = self.feed.lock().await;
        Ok(feed
            .messages
            .iter()
            .filter(|m| m.message.internal == internal)
            .filter_map(|m| {
                feed.memberships.get(&m.ephemeral_pubkey).map(|record| SignedMessageWithProof {
                    signed: m.clone(),
                    proof: record.proof.clone(),
                    proof_args: record.proof_args.clone(),
                })
            })
            .collect())
    }
}
