use super::{OAuthProvider, ProviderKind, ProviderProfile};
use crate::config::{NymphConfig, OAuthClientConfig};

/// Google Workspace: the group is the `hd` claim, else the email domain.
pub struct Google;

impl ProviderProfile for Google {
    const KIND: ProviderKind = ProviderKind::Google;

    fn client_config(config: &NymphConfig) -> &OAuthClientConfig {
        &config.google
    }

    fn group_title(domain: &str) -> String {
        format!("{} Workspace", domain)
    }
}

pub type GoogleProvider = OAuthProvider<Google>;
