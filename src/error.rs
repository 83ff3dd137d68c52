//! Error taxonomy shared by every component.

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by key management, token handling, proving and posting.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    #[error("No ephemeral key available")]
    NoKey,

    #[error("Malformed identity token: {0}")]
    MalformedToken(String),

    #[error("No organization domain found in identity token")]
    NoDomain,

    #[error("Domain is {len} bytes, circuit maximum is {max}")]
    DomainTooLong { len: usize, max: usize },

    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Email address is not verified by the identity provider")]
    EmailVerification,

    #[error("Authentication cancelled: {0}")]
    AuthCancelled(String),

    #[error("Authentication timed out after {0} seconds")]
    AuthTimeout(u64),

    #[error("Identity provider error: {0}")]
    AuthProvider(String),

    #[error("Organization policy violation: {0}")]
    OrgPolicyViolation(String),

    #[error("Identity token signature is invalid: {0}")]
    InvalidTokenSignature(String),

    #[error("Not authenticated with provider {0}")]
    NotAuthenticated(String),

    #[error("Proof generation failed: {0}")]
    ProofGeneration(String),

    #[error("Proof verification failed: {0}")]
    ProofVerification(String),

    #[error("Circuit field {field} needs {len} bytes, maximum is {max}")]
    CircuitInputOverflow {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("No registered identity; register with a provider first")]
    NoIdentity,

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Message was not sent: {source}")]
    MessageNotSent {
        /// The text the caller tried to post, kept for resubmission.
        text: String,
        #[source]
        source: Box<Error>,
    },

    #[error("Malformed encoded field: {0}")]
    Encoding(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the caller may retry the failed operation as-is.
    ///
    /// Extraction and validation failures are terminal for the current
    /// registration attempt; I/O and proving failures are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Storage(_)
            | Error::ProofGeneration(_)
            | Error::Transport(_)
            | Error::AuthTimeout(_)
            | Error::AuthCancelled(_) => true,
            Error::MessageNotSent { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Storage(format!("corrupt record: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_policy() {
        assert!(Error::Storage("disk".into()).is_retryable());
        assert!(Error::ProofGeneration("backend".into()).is_retryable());
        assert!(!Error::EmailVerification.is_retryable());
        assert!(!Error::DomainTooLong { len: 65, max: 64 }.is_retryable());
        assert!(!Error::MalformedToken("x".into()).is_retryable());
    }

    #[test]
    fn test_unsent_message_keeps_text() {
        let err = Error::MessageNotSent {
            text: "hello".into(),
            source: Box::new(Error::Transport("offline".into())),
        };
        assert!(err.is_retryable());
        match err {
            Error::MessageNotSent { text, .. } => assert_eq!(text, "hello"),
            _ => unreachable!(),
        }
    }
}
