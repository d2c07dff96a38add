//! Identity-provider abstraction and the registry of configured providers.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

/// Access token handed back by a provider's token endpoint.
#[derive(Clone)]
pub struct ProviderToken {
    pub access_token: String,
    pub token_type: Option<String>,
}

impl std::fmt::Debug for ProviderToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderToken")
            .field("token_type", &self.token_type)
            .finish_non_exhaustive()
    }
}

/// Normalized profile of the authenticated external account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderUserInfo {
    /// Stable account id at the provider.
    pub external_id: String,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
}

/// Failures talking to an identity provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Provider responded with status {0}")]
    Status(u16),

    #[error("Provider rejected the request: {0}")]
    Rejected(String),

    #[error("Unexpected provider response: {0}")]
    Payload(String),

    #[error("Invalid provider configuration: {0}")]
    Config(String),
}

/// One federated identity provider.
#[async_trait]
pub trait OAuthProvider: Send + Sync {
    /// Registry key, e.g. `"github"`.
    fn name(&self) -> &str;

    /// Authorization URL the user agent is redirected to.
    fn auth_url(&self, state: &str) -> String;

    /// Exchange an authorization code for an access token.
    async fn exchange(&self, code: &str) -> Result<ProviderToken, ProviderError>;

    /// Fetch the account profile using a token from [`OAuthProvider::exchange`].
    async fn user_info(&self, token: &ProviderToken) -> Result<ProviderUserInfo, ProviderError>;
}

/// Providers available for login, keyed by name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn OAuthProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `provider`, replacing any provider registered under the same name.
    pub fn register(&mut self, provider: Arc<dyn OAuthProvider>) {
        self.providers.insert(provider.name().to_string(), provider);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn OAuthProvider>> {
        self.providers.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.providers.keys()).finish()
    }
}
