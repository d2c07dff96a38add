//! Session tokens: issuing, refreshing, revoking, and authenticating.
//!
//! Every refresh rotates the refresh token. The old row is revoked with a
//! conditional update, so of two concurrent refreshes presenting the same
//! token exactly one wins; the other gets [`CoreError::RevokedToken`].

use std::sync::Arc;

use chrono::Utc;
use idforge_core::error::{CoreError, CoreResult};
use idforge_core::types::{DbId, Timestamp};
use idforge_db::models::refresh_token::{CreateRefreshToken, RefreshToken};
use idforge_db::models::user::User;
use idforge_db::repositories::{RefreshTokenRepository, UserRepository};
use serde::{Deserialize, Serialize};

use crate::jwt::{hash_refresh_token, Claims, TokenGenerator};

/// Token type reported to clients.
pub const BEARER: &str = "Bearer";

/// Request metadata recorded on the refresh-token row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientContext {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// Access + refresh token pair returned by login and refresh.
#[derive(Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: &'static str,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    pub expires_at: Timestamp,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Issues and rotates session tokens.
#[derive(Clone)]
pub struct TokenService {
    users: Arc<dyn UserRepository>,
    refresh_tokens: Arc<dyn RefreshTokenRepository>,
    generator: Arc<dyn TokenGenerator>,
}

impl TokenService {
    pub fn new(
        users: Arc<dyn UserRepository>,
        refresh_tokens: Arc<dyn RefreshTokenRepository>,
        generator: Arc<dyn TokenGenerator>,
    ) -> Self {
        Self {
            users,
            refresh_tokens,
            generator,
        }
    }

    /// Mint an access token and persist a new refresh token for `user`.
    pub async fn issue(&self, user: &User, ctx: &ClientContext) -> CoreResult<TokenPair> {
        let access = self.generator.generate_access_token(user.id, &user.email)?;
        let refresh = self.generator.generate_refresh_token();

        let row = self
            .refresh_tokens
            .create(&CreateRefreshToken {
                user_id: user.id,
                token_hash: refresh.hash,
                expires_at: refresh.expires_at,
                user_agent: ctx.user_agent.clone(),
                ip_address: ctx.ip_address.clone(),
            })
            .await?;

        tracing::debug!(user_id = user.id, session_id = row.id, "Issued token pair");

        Ok(TokenPair {
            expires_in: access.expires_in(),
            expires_at: access.expires_at,
            access_token: access.token,
            refresh_token: refresh.raw,
            token_type: BEARER,
        })
    }

    /// Exchange a refresh token for a new pair, revoking the presented one.
    ///
    /// Expiry is checked before revocation, so an expired token always
    /// reports [`CoreError::ExpiredToken`].
    pub async fn refresh(&self, raw_token: &str, ctx: &ClientContext) -> CoreResult<TokenPair> {
        let now = Utc::now();
        let token = self
            .refresh_tokens
            .find_by_hash(&hash_refresh_token(raw_token))
            .await?
            .ok_or(CoreError::InvalidToken)?;

        if token.is_expired(now) {
            return Err(CoreError::ExpiredToken);
        }
        if token.is_revoked() {
            tracing::warn!(
                user_id = token.user_id,
                session_id = token.id,
                "Revoked refresh token presented",
            );
            return Err(CoreError::RevokedToken);
        }

        if !self.refresh_tokens.revoke(token.id, now).await? {
            tracing::warn!(
                user_id = token.user_id,
                session_id = token.id,
                "Refresh token revoked concurrently",
            );
            return Err(CoreError::RevokedToken);
        }

        let user = self
            .users
            .find_by_id(token.user_id)
            .await?
            .ok_or(CoreError::InvalidToken)?;

        self.issue(&user, ctx).await
    }

    /// Revoke every live refresh token of `user_id`. Returns the count revoked.
    pub async fn logout(&self, user_id: DbId) -> CoreResult<u64> {
        let revoked = self
            .refresh_tokens
            .revoke_all_for_user(user_id, Utc::now())
            .await?;
        tracing::info!(user_id, revoked, "User logged out");
        Ok(revoked)
    }

    /// Verify an access token and return its claims.
    pub fn authenticate(&self, access_token: &str) -> CoreResult<Claims> {
        self.generator.validate_access_token(access_token)
    }

    /// Sessions of `user_id` that can still be refreshed.
    pub async fn active_sessions(&self, user_id: DbId) -> CoreResult<Vec<RefreshToken>> {
        let now = Utc::now();
        let sessions = self.refresh_tokens.list_by_user(user_id).await?;
        Ok(sessions.into_iter().filter(|t| t.is_valid(now)).collect())
    }

    /// Delete refresh tokens that expired before now. Returns the count deleted.
    pub async fn purge_expired(&self) -> CoreResult<u64> {
        Ok(self.refresh_tokens.delete_expired(Utc::now()).await?)
    }
}
