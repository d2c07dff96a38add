//! Repository for the `system_api_keys` table.

use async_trait::async_trait;
use chrono::Utc;
use idforge_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::error::DbResult;
use crate::models::system_api_key::{
    CreateSystemApiKey, SystemApiKey, UpdateSystemApiKey, UsageDelta,
};

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

const COLUMNS: &str = "\
    id, user_id, name, key_hash, key_prefix, scopes, rate_limit_rpm, rate_limit_tpm, \
    total_requests, total_input_tokens, total_output_tokens, total_cost_usd, \
    cache_hits, cache_misses, is_active, last_used_at, expires_at, allowed_ips, \
    rotate_after_days, last_rotated_at, created_at, updated_at";

/// Persistence contract for system-issued keys.
#[async_trait]
pub trait SystemApiKeyRepository: Send + Sync {
    async fn create(&self, input: &CreateSystemApiKey) -> DbResult<SystemApiKey>;

    async fn find_by_id(&self, id: DbId) -> DbResult<Option<SystemApiKey>>;

    /// Look up a key by the digest of its raw value.
    async fn find_by_hash(&self, key_hash: &str) -> DbResult<Option<SystemApiKey>>;

    /// All keys of a user, newest first.
    async fn list_by_user(&self, user_id: DbId) -> DbResult<Vec<SystemApiKey>>;

    async fn count_by_user(&self, user_id: DbId) -> DbResult<i64>;

    /// Apply the non-`None` fields of `input`.
    async fn update(
        &self,
        id: DbId,
        input: &UpdateSystemApiKey,
    ) -> DbResult<Option<SystemApiKey>>;

    /// Replace hash and prefix and stamp `last_rotated_at`.
    async fn rotate(
        &self,
        id: DbId,
        key_hash: &str,
        key_prefix: &str,
        at: Timestamp,
    ) -> DbResult<Option<SystemApiKey>>;

    /// Stamp `last_used_at`. Returns `true` if the row exists.
    async fn update_last_used(&self, id: DbId, at: Timestamp) -> DbResult<bool>;

    /// Atomically add `delta` to the usage counters.
    ///
    /// The in-memory store saturates at `i64::MAX`; PostgreSQL reports
    /// `bigint out of range`.
    async fn record_usage(&self, id: DbId, delta: &UsageDelta) -> DbResult<bool>;

    /// Hard delete. Returns `true` if a row was deleted.
    async fn delete(&self, id: DbId) -> DbResult<bool>;
}

/// PostgreSQL-backed [`SystemApiKeyRepository`].
#[derive(Debug, Clone)]
pub struct PgSystemApiKeyRepo {
    pool: PgPool,
}

impl PgSystemApiKeyRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SystemApiKeyRepository for PgSystemApiKeyRepo {
    async fn create(&self, input: &CreateSystemApiKey) -> DbResult<SystemApiKey> {
        let query = format!(
            "INSERT INTO system_api_keys \
                (user_id, name, key_hash, key_prefix, scopes, rate_limit_rpm, rate_limit_tpm, \
                 expires_at, allowed_ips, rotate_after_days) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10) \
             RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, SystemApiKey>(&query)
            .bind(input.user_id)
            .bind(&input.name)
            .bind(&input.key_hash)
            .bind(&input.key_prefix)
            .bind(&input.scopes)
            .bind(input.rate_limit_rpm)
            .bind(input.rate_limit_tpm)
            .bind(input.expires_at)
            .bind(&input.allowed_ips)
            .bind(input.rotate_after_days)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn find_by_id(&self, id: DbId) -> DbResult<Option<SystemApiKey>> {
        let query = format!("SELECT {COLUMNS} FROM system_api_keys WHERE id = $1");
        Ok(sqlx::query_as::<_, SystemApiKey>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_hash(&self, key_hash: &str) -> DbResult<Option<SystemApiKey>> {
        let query = format!("SELECT {COLUMNS} FROM system_api_keys WHERE key_hash = $1");
        Ok(sqlx::query_as::<_, SystemApiKey>(&query)
            .bind(key_hash)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_by_user(&self, user_id: DbId) -> DbResult<Vec<SystemApiKey>> {
        let query = format!(
            "SELECT {COLUMNS} FROM system_api_keys WHERE user_id = $1 ORDER BY created_at DESC"
        );
        Ok(sqlx::query_as::<_, SystemApiKey>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn count_by_user(&self, user_id: DbId) -> DbResult<i64> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM system_api_keys WHERE user_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?,
        )
    }

    async fn update(
        &self,
        id: DbId,
        input: &UpdateSystemApiKey,
    ) -> DbResult<Option<SystemApiKey>> {
        let query = format!(
            "UPDATE system_api_keys SET \
                 name = COALESCE($2, name), \
                 scopes = COALESCE($3, scopes), \
                 rate_limit_rpm = COALESCE($4, rate_limit_rpm), \
                 rate_limit_tpm = COALESCE($5, rate_limit_tpm), \
                 is_active = COALESCE($6, is_active), \
                 updated_at = $7 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, SystemApiKey>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(&input.scopes)
            .bind(input.rate_limit_rpm)
            .bind(input.rate_limit_tpm)
            .bind(input.is_active)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn rotate(
        &self,
        id: DbId,
        key_hash: &str,
        key_prefix: &str,
        at: Timestamp,
    ) -> DbResult<Option<SystemApiKey>> {
        let query = format!(
            "UPDATE system_api_keys SET \
                 key_hash = $2, key_prefix = $3, last_rotated_at = $4, updated_at = $4 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, SystemApiKey>(&query)
            .bind(id)
            .bind(key_hash)
            .bind(key_prefix)
            .bind(at)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_last_used(&self, id: DbId, at: Timestamp) -> DbResult<bool> {
        let result = sqlx::query("UPDATE system_api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn record_usage(&self, id: DbId, delta: &UsageDelta) -> DbResult<bool> {
        let result = sqlx::query(
            "UPDATE system_api_keys SET \
                 total_requests = total_requests + $2, \
                 total_input_tokens = total_input_tokens + $3, \
                 total_output_tokens = total_output_tokens + $4, \
                 total_cost_usd = total_cost_usd + $5, \
                 cache_hits = cache_hits + $6, \
                 cache_misses = cache_misses + $7 \
             WHERE id = $1",
        )
        .bind(id)
        .bind(delta.requests)
        .bind(delta.input_tokens)
        .bind(delta.output_tokens)
        .bind(delta.cost_usd)
        .bind(delta.cache_hits)
        .bind(delta.cache_misses)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: DbId) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM system_api_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
