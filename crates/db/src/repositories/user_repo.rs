//! Repository for the `users` table.

use async_trait::async_trait;
use chrono::Utc;
use idforge_core::types::DbId;
use sqlx::PgPool;

use crate::error::DbResult;
use crate::models::user::{CreateUser, UpdateUserProfile, User};

/// Column list shared across queries to avoid repetition.
const COLUMNS: &str = "id, email, name, avatar_url, provider, provider_user_id, \
                        email_verified, created_at, updated_at";

/// Persistence contract for federated users.
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Find a user by internal ID.
    async fn find_by_id(&self, id: DbId) -> DbResult<Option<User>>;

    /// Find the user linked to an external identity.
    async fn find_by_provider_identity(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> DbResult<Option<User>>;

    /// Insert a new user, returning the created row.
    async fn create(&self, input: &CreateUser) -> DbResult<User>;

    /// Replace the provider-synced display fields. Returns `None` if absent.
    async fn update_profile(&self, id: DbId, input: &UpdateUserProfile)
        -> DbResult<Option<User>>;
}

/// PostgreSQL-backed [`UserRepository`].
#[derive(Debug, Clone)]
pub struct PgUserRepo {
    pool: PgPool,
}

impl PgUserRepo {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepo {
    async fn find_by_id(&self, id: DbId) -> DbResult<Option<User>> {
        let query = format!("SELECT {COLUMNS} FROM users WHERE id = $1");
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn find_by_provider_identity(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> DbResult<Option<User>> {
        let query = format!(
            "SELECT {COLUMNS} FROM users WHERE provider = $1 AND provider_user_id = $2"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(provider)
            .bind(provider_user_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn create(&self, input: &CreateUser) -> DbResult<User> {
        let query = format!(
            "INSERT INTO users (email, name, avatar_url, provider, provider_user_id, email_verified)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(&input.email)
            .bind(&input.name)
            .bind(&input.avatar_url)
            .bind(&input.provider)
            .bind(&input.provider_user_id)
            .bind(input.email_verified)
            .fetch_one(&self.pool)
            .await?)
    }

    async fn update_profile(
        &self,
        id: DbId,
        input: &UpdateUserProfile,
    ) -> DbResult<Option<User>> {
        let query = format!(
            "UPDATE users SET name = $2, avatar_url = $3, updated_at = $4
             WHERE id = $1
             RETURNING {COLUMNS}"
        );
        Ok(sqlx::query_as::<_, User>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(&input.avatar_url)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?)
    }
}
