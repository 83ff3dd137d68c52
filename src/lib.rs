//! Nymph - post as "someone at your organization" without saying who
//!
//! A device holds a short-lived Ed25519 key. Signing in with an
//! organizational identity provider yields a zero-knowledge proof that the
//! key belongs to someone at a given domain; the key then signs messages
//! that anyone can check against that proof.
//!
//! # Architecture
//!
//! 1. [`keys::EphemeralKeyManager`] generates and rotates the ephemeral key
//!    and its binding nonce
//! 2. A [`provider::AnonymousMembershipProvider`] authenticates, extracts the
//!    organization domain and proves membership through a
//!    [`backend::ProofBackend`]
//! 3. [`pipeline::MessageSigningPipeline`] registers the key, signs posts and
//!    verifies incoming ones
//! 4. [`NymphContext`] wires everything together once at startup

pub mod backend;
pub mod circuit;
pub mod clock;
pub mod config;
pub mod context;
pub mod crypto;
pub mod error;
pub mod jwt;
pub mod keys;
pub mod message;
pub mod nonce;
pub mod oauth;
pub mod pipeline;
pub mod provider;
pub mod store;
pub mod transport;

#[cfg(test)]
mod proptests;

// Re-export main types
pub use backend::{Groth16Backend, MockProofBackend, ProofBackend, PublicStatement};
pub use config::NymphConfig;
pub use context::{NymphContext, NymphContextBuilder};
pub use crypto::{EphemeralPublicKey, EphemeralSignature};
pub use error::{Error, Result};
pub use keys::{EphemeralKey, EphemeralKeyManager};
pub use message::{Message, SignedMessage, SignedMessageWithProof};
pub use nonce::BindingNonce;
pub use pipeline::{Membership, MessageSigningPipeline, Registration, Status};
pub use provider::{AnonGroup, AnonymousMembershipProvider, ProofArgs, ProviderKind};
