//! Repository for the `oauth_states` table.

use async_trait::async_trait;
use chrono::Utc;
use idforge_core::types::Timestamp;
use sqlx::PgPool;

use crate::error::DbResult;

/// Storage for short-lived OAuth `state -> provider` pairs.
///
/// Entries past their deadline must read as absent.
#[async_trait]
pub trait OAuthStateRepository: Send + Sync {
    async fn set(&self, state: &str, provider: &str, expires_at: Timestamp) -> DbResult<()>;

    /// The provider stored for `state`, if present and unexpired.
    async fn get(&self, state: &str) -> DbResult<Option<String>>;

    /// Remove `state`. Returns `true` if an entry was removed.
    async fn delete(&self, state: &str) -> DbResult<bool>;

    /// Remove `state` and return its provider in one step.
    ///
    /// The entry is removed even when expired; only an unexpired entry yields
    /// `Some`. Of two concurrent callers at most one receives the provider.
    async fn take(&self, state: &str) -> DbResult<Option<String>>;

    /// Drop every entry whose deadline is before `now`.
    async fn purge_expired(&self, now: Timestamp) -> DbResult<u64>;
}

/// PostgreSQL-backed [`OAuthStateRepository`], for deployments running more
/// than one service instance.
#[derive(Debug, Clone)]
pub struct PgOAuthStateRepo {
    pool: PgPool,
}

impl PgOAuthStateRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OAuthStateRepository for PgOAuthStateRepo {
    async fn set(&self, state: &str, provider: &str, expires_at: Timestamp) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO oauth_states (state, provider, expires_at) VALUES ($1, $2, $3)
             ON CONFLICT (state) DO UPDATE SET
                provider = EXCLUDED.provider,
                expires_at = EXCLUDED.expires_at",
        )
        .bind(state)
        .bind(provider)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, state: &str) -> DbResult<Option<String>> {
        Ok(sqlx::query_scalar(
            "SELECT provider FROM oauth_states WHERE state = $1 AND expires_at > $2",
        )
        .bind(state)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete(&self, state: &str) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM oauth_states WHERE state = $1")
            .bind(state)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn take(&self, state: &str) -> DbResult<Option<String>> {
        let row: Option<(String, Timestamp)> = sqlx::query_as(
            "DELETE FROM oauth_states WHERE state = $1 RETURNING provider, expires_at",
        )
        .bind(state)
        .fetch_optional(&self.pool)
        .await?;
        let now = Utc::now();
        Ok(row.and_then(|(provider, expires_at)| (expires_at > now).then_some(provider)))
    }

    async fn purge_expired(&self, now: Timestamp) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM oauth_states WHERE expires_at < $1")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
