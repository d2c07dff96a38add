//! Repository for the `user_api_keys` table.

use async_trait::async_trait;
use chrono::Utc;
use idforge_core::types::{DbId, Timestamp};
use sqlx::PgPool;

use crate::error::DbResult;
use crate::models::user_api_key::{CreateUserApiKey, UserApiKey};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, user_id, provider, name, encrypted_key, key_prefix, scopes, \
                        last_used_at, created_at, updated_at";

/// Persistence contract for user-held provider keys.
#[async_trait]
pub trait UserApiKeyRepository: Send + Sync {
    /// Insert a new key.
    ///
    /// Must fail with [`crate::DbError::Conflict`] when a key for the same
    /// `(user_id, provider)` already exists, atomically with the insert.
    async fn create(&self, input: &CreateUserApiKey) -> DbResult<UserApiKey>;

    async fn find_by_id(&self, id: DbId) -> DbResult<Option<UserApiKey>>;

    async fn find_by_user_and_provider(
        &self,
        user_id: DbId,
        provider: &str,
    ) -> DbResult<Option<UserApiKey>>;

    /// All keys of a user ordered by provider.
    async fn list_by_user(&self, user_id: DbId) -> DbResult<Vec<UserApiKey>>;

    /// Replace the encrypted value and display prefix in place.
    async fn update_secret(
        &self,
        id: DbId,
        encrypted_key: &str,
        key_prefix: &str,
    ) -> DbResult<Option<UserApiKey>>;

    /// Stamp `last_used_at`. Returns `true` if the row exists.
    async fn update_last_used(&self, id: DbId, at: Timestamp) -> DbResult<bool>;

    /// Hard delete. Returns `true` if a row was deleted.
    async fn delete(&self, id: DbId) -> DbResult<bool>;
}

/// PostgreSQL-backed [`UserApiKeyRepository`].
///
/// Uniqueness comes from the `uq_user_api_keys_user_provider` constraint.
#[derive(Debug, Clone)]
pub struct PgUserApiKeyRepo {
    pool: PgPool,
}

impl PgUserApiKeyRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserApiKeyRepository for PgUserApiKeyRepo {
    async fn create(&self, input: &CreateUserApiKey) -> DbResult<UserApiKey> {
        let query = format!(
            "INSERT INTO user_api_keys (user_id, provider, name, encrypted_key, key_prefix, scopes)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, UserApiKey>(&query)
            .bind(input.user_id)
            .bind(&input.provider)
            .bind(&input.name)
            .bind(&input.encrypted_key)
            .bind(&input.key_prefix)
            .bind(&input.scopes)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn find_by_id(&self, id: DbId) -> DbResult<Option<UserApiKey>> {
        let query = format!("SELECT {COLUMNS} FROM user_api_keys WHERE id = $1");
        Ok(sqlx::query_as::<_, UserApiKey>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_user_and_provider(
        &self,
        user_id: DbId,
        provider: &str,
    ) -> DbResult<Option<UserApiKey>> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_api_keys WHERE user_id = $1 AND provider = $2"
        );
        Ok(sqlx::query_as::<_, UserApiKey>(&query)
            .bind(user_id)
            .bind(provider)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn list_by_user(&self, user_id: DbId) -> DbResult<Vec<UserApiKey>> {
        let query = format!(
            "SELECT {COLUMNS} FROM user_api_keys WHERE user_id = $1 ORDER BY provider"
        );
        Ok(sqlx::query_as::<_, UserApiKey>(&query)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?)
    }

    async fn update_secret(
        &self,
        id: DbId,
        encrypted_key: &str,
        key_prefix: &str,
    ) -> DbResult<Option<UserApiKey>> {
        let query = format!(
            "UPDATE user_api_keys SET encrypted_key = $2, key_prefix = $3, updated_at = $4
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, UserApiKey>(&query)
            .bind(id)
            .bind(encrypted_key)
            .bind(key_prefix)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn update_last_used(&self, id: DbId, at: Timestamp) -> DbResult<bool> {
        let result = sqlx::query("UPDATE user_api_keys SET last_used_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete(&self, id: DbId) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM user_api_keys WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
