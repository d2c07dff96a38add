//! Identity and credential services.
//!
//! - [`oauth`] -- federated login (authorization-code flow, CSRF state).
//! - [`tokens`] -- JWT access tokens and rotating refresh tokens.
//! - [`user_keys`] -- encrypted user-supplied provider keys.
//! - [`system_keys`] -- hashed system-issued API keys with scopes and quotas.
//!
//! [`CredentialServices`] wires them over a [`Repositories`] bundle.

use std::sync::Arc;

use chrono::Duration;
use idforge_core::crypto::{AesGcmCodec, SecretCodec};
use idforge_db::Repositories;

pub mod config;
pub mod jwt;
pub mod oauth;
pub mod system_keys;
pub mod tokens;
pub mod usage;
pub mod user_keys;

pub use config::{AuthConfig, ConfigError};

use jwt::JwtTokenGenerator;
use oauth::{OAuth2Provider, OAuthLoginService, ProviderRegistry, StateManager};
use system_keys::SystemKeyManager;
use tokens::TokenService;
use usage::UsageTracker;
use user_keys::UserKeyManager;

/// Fully wired credential services sharing one set of repositories.
#[derive(Clone)]
pub struct CredentialServices {
    pub login: OAuthLoginService,
    pub tokens: TokenService,
    pub user_keys: UserKeyManager,
    pub system_keys: SystemKeyManager,
    pub usage: UsageTracker,
}

impl CredentialServices {
    /// Build from configuration: HTTP providers for every configured
    /// `OAUTH_*` entry and an AES-256-GCM codec from the encryption key.
    pub fn from_config(config: &AuthConfig, repos: Repositories) -> Result<Self, ConfigError> {
        let mut providers = ProviderRegistry::new();
        for settings in &config.providers {
            let provider =
                OAuth2Provider::new(settings.clone()).map_err(|e| ConfigError::Invalid {
                    var: format!("OAUTH_{}_*", settings.name.to_uppercase()),
                    reason: e.to_string(),
                })?;
            providers.register(Arc::new(provider));
        }

        let codec =
            AesGcmCodec::from_base64(&config.encryption_key).map_err(|e| ConfigError::Invalid {
                var: "CREDENTIAL_ENCRYPTION_KEY".into(),
                reason: e.to_string(),
            })?;

        if providers.is_empty() {
            tracing::warn!("No OAuth providers configured; federated login is unavailable");
        }
        tracing::info!(
            providers = %providers.names().collect::<Vec<_>>().join(","),
            max_system_keys_per_user = config.max_system_keys_per_user,
            "Credential services configured",
        );

        Ok(Self::assemble(config, repos, providers, Arc::new(codec)))
    }

    /// Build with caller-supplied providers and codec.
    pub fn assemble(
        config: &AuthConfig,
        repos: Repositories,
        providers: ProviderRegistry,
        codec: Arc<dyn SecretCodec>,
    ) -> Self {
        let usage = UsageTracker::new(config.usage_update_timeout);
        let generator = Arc::new(JwtTokenGenerator::new(config.jwt.clone()));

        let tokens = TokenService::new(
            Arc::clone(&repos.users),
            Arc::clone(&repos.refresh_tokens),
            generator,
        );
        let states = StateManager::new(
            Arc::clone(&repos.oauth_states),
            Duration::seconds(config.oauth_state_ttl_secs),
        );
        let login = OAuthLoginService::new(
            providers,
            states,
            Arc::clone(&repos.users),
            tokens.clone(),
        );
        let user_keys = UserKeyManager::new(
            Arc::clone(&repos.user_api_keys),
            Arc::clone(&codec),
            usage.clone(),
        );
        let system_keys = SystemKeyManager::new(
            Arc::clone(&repos.system_api_keys),
            codec,
            usage.clone(),
            config.max_system_keys_per_user,
        );

        Self {
            login,
            tokens,
            user_keys,
            system_keys,
            usage,
        }
    }
}
