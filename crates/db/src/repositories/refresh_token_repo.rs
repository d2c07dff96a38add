//! Repository for the `refresh_tokens` table.

use async_trait::async_trait;
use idforge_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::error::DbResult;
use crate::models::refresh_token::{CreateRefreshToken, RefreshToken};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, token_hash, expires_at, created_at, revoked_at, \
                        user_agent, ip_address";

/// Persistence contract for refresh tokens.
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    /// Insert a new token row, returning it.
    async fn create(&self, input: &CreateRefreshToken) -> DbResult<RefreshToken>;

    /// Find a token by its hash, whether or not it is still valid.
    ///
    /// Callers distinguish expired from revoked themselves.
    async fn find_by_hash(&self, token_hash: &str) -> DbResult<Option<RefreshToken>>;

    /// All tokens of a user, newest first.
    async fn list_by_user(&self, user_id: DbId) -> DbResult<Vec<RefreshToken>>;

    /// Revoke a single token if it is not revoked yet.
    ///
    /// Returns `true` only for the caller whose update took effect, so two
    /// concurrent revocations of the same token yield exactly one `true`.
    async fn revoke(&self, id: DbId, at: Timestamp) -> DbResult<bool>;

    /// Revoke every unrevoked token of a user. Returns the count revoked.
    async fn revoke_all_for_user(&self, user_id: DbId, at: Timestamp) -> DbResult<u64>;

    /// Delete tokens whose `expires_at` is before `cutoff`.
    ///
    /// Revoked but unexpired rows are kept so reuse stays detectable.
    async fn delete_expired(&self, cutoff: Timestamp) -> DbResult<u64>;
}

/// PostgreSQL-backed [`RefreshTokenRepository`].
#[derive(Debug, Clone)]
pub struct PgRefreshTokenRepo {
    pool: PgPool,
}

impl PgRefreshTokenRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenRepository for PgRefreshTokenRepo {
    async fn create(&self, input: &CreateRefreshToken) -> DbResult<RefreshToken> {
        let query = format!(
            "INSERT INTO refresh_tokens (user_id, token_hash, expires_at, user_agent, ip_address)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, RefreshToken>(&query)
            .bind(input.user_id)
            .bind(&input.token_hash)
            .bind(input.expires_at)
            .bind(&input.user_agent)
            .bind(&input.ip_address)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn find_by_hash(&self, token_hash: &str) -> DbResult<Option<RefreshToken>> {
        let query = format!("SELECT {COLUMNS} FROM refresh_tokens WHERE token_hash = $1");
        Ok(sqlx::query_as::<_, RefreshToken>(&query)
            .bind(token_hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_by_user(&self, user_id: DbId) -> DbResult<Vec<RefreshToken>> {
        let query = format!(
            "SELECT {COLUMNS} FROM refresh_tokens WHERE user_id = $1 ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, RefreshToken>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn revoke(&self, id: DbId, at: Timestamp) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2 WHERE id = $1 AND revoked_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn revoke_all_for_user(&self, user_id: DbId, at: Timestamp) -> DbResult<u64> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_at = $2
             WHERE user_id = $1 AND revoked_at IS NULL",
        )
        .bind(user_id)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete_expired(&self, cutoff: Timestamp) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
