//! Federated login: redirect initiation and callback completion.

use std::sync::Arc;

use idforge_core::error::{CoreError, CoreResult};
use idforge_db::models::user::{CreateUser, UpdateUserProfile, User};
use idforge_db::repositories::UserRepository;
use idforge_db::DbError;
use serde::{Deserialize, Serialize};

use super::provider::{ProviderRegistry, ProviderUserInfo};
use super::state::StateManager;
use crate::tokens::{ClientContext, TokenPair, TokenService};

/// Where to send the user agent to start a login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRedirect {
    pub auth_url: String,
    pub state: String,
}

/// Callback parameters of a provider redirect.
#[derive(Debug, Clone, Deserialize)]
pub struct CompleteLogin {
    pub provider: String,
    pub code: String,
    pub state: String,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

/// Result of a successful login.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub user: User,
    pub tokens: TokenPair,
    pub is_new_user: bool,
}

/// Orchestrates the authorization-code login flow.
#[derive(Clone)]
pub struct OAuthLoginService {
    providers: ProviderRegistry,
    states: StateManager,
    users: Arc<dyn UserRepository>,
    tokens: TokenService,
}

impl OAuthLoginService {
    pub fn new(
        providers: ProviderRegistry,
        states: StateManager,
        users: Arc<dyn UserRepository>,
        tokens: TokenService,
    ) -> Self {
        Self {
            providers,
            states,
            users,
            tokens,
        }
    }

    /// Issue a state value and build the provider's authorization URL.
    pub async fn initiate_login(&self, provider: &str) -> CoreResult<LoginRedirect> {
        let idp = self
            .providers
            .get(provider)
            .ok_or_else(|| CoreError::InvalidProvider(provider.to_string()))?;

        let state = self.states.issue(provider).await?;
        tracing::debug!(provider, "OAuth login initiated");

        Ok(LoginRedirect {
            auth_url: idp.auth_url(&state),
            state,
        })
    }

    /// Finish a login from the provider callback.
    ///
    /// The state entry is consumed first and exactly once, whatever the
    /// outcome of the remaining steps.
    pub async fn complete_login(&self, cmd: CompleteLogin) -> CoreResult<LoginOutcome> {
        let issued_for = self.states.consume(&cmd.state).await?;
        if issued_for.as_deref() != Some(cmd.provider.as_str()) {
            tracing::warn!(provider = %cmd.provider, "OAuth state missing, expired, or mismatched");
            return Err(CoreError::InvalidOAuthState);
        }

        let idp = self
            .providers
            .get(&cmd.provider)
            .ok_or_else(|| CoreError::InvalidProvider(cmd.provider.clone()))?;

        let token = idp.exchange(&cmd.code).await.map_err(|e| {
            tracing::warn!(provider = %cmd.provider, error = %e, "OAuth code exchange failed");
            CoreError::InvalidOAuthCode
        })?;

        let info = idp.user_info(&token).await.map_err(|e| {
            tracing::warn!(provider = %cmd.provider, error = %e, "OAuth profile fetch failed");
            CoreError::OAuthFailed(format!("could not fetch {} profile", cmd.provider))
        })?;

        let (user, is_new_user) = self.resolve_user(&cmd.provider, info).await?;

        let ctx = ClientContext {
            user_agent: cmd.user_agent,
            ip_address: cmd.ip_address,
        };
        let tokens = self.tokens.issue(&user, &ctx).await?;

        tracing::info!(
            user_id = user.id,
            provider = %cmd.provider,
            is_new_user,
            "User logged in",
        );

        Ok(LoginOutcome {
            user,
            tokens,
            is_new_user,
        })
    }

    /// Find the user linked to the external identity, syncing display fields,
    /// or create one.
    async fn resolve_user(&self, provider: &str, info: ProviderUserInfo) -> CoreResult<(User, bool)> {
        if let Some(existing) = self
            .users
            .find_by_provider_identity(provider, &info.external_id)
            .await?
        {
            return Ok((self.sync_profile(existing, &info).await?, false));
        }

        let created = self
            .users
            .create(&CreateUser {
                email: info.email.clone(),
                name: info.name.clone(),
                avatar_url: info.avatar_url.clone(),
                provider: provider.to_string(),
                provider_user_id: info.external_id.clone(),
                email_verified: true,
            })
            .await;

        match created {
            Ok(user) => Ok((user, true)),
            // A concurrent first login created the row between find and create.
            Err(DbError::Conflict(_)) => {
                let user = self
                    .users
                    .find_by_provider_identity(provider, &info.external_id)
                    .await?
                    .ok_or_else(|| CoreError::Internal("user vanished after conflict".into()))?;
                Ok((self.sync_profile(user, &info).await?, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn sync_profile(&self, user: User, info: &ProviderUserInfo) -> CoreResult<User> {
        if user.name == info.name && user.avatar_url == info.avatar_url {
            return Ok(user);
        }

        let updated = self
            .users
            .update_profile(
                user.id,
                &UpdateUserProfile {
                    name: info.name.clone(),
                    avatar_url: info.avatar_url.clone(),
                },
            )
            .await?;
        Ok(updated.unwrap_or(user))
    }
}
