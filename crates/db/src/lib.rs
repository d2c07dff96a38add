//! Persistence for idforge credentials.
//!
//! Repositories are async traits so the orchestration layer can run against
//! PostgreSQL ([`repositories`]) or the in-process tables in [`memory`].

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

pub mod error;
pub mod memory;
pub mod models;
pub mod repositories;

pub use error::{DbError, DbResult};

use repositories::{
    OAuthStateRepository, PgOAuthStateRepo, PgRefreshTokenRepo, PgSystemApiKeyRepo,
    PgUserApiKeyRepo, PgUserRepo, RefreshTokenRepository, SystemApiKeyRepository,
    UserApiKeyRepository, UserRepository,
};

pub type DbPool = sqlx::PgPool;

/// One handle per repository, shared by the services built on top.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub refresh_tokens: Arc<dyn RefreshTokenRepository>,
    pub user_api_keys: Arc<dyn UserApiKeyRepository>,
    pub system_api_keys: Arc<dyn SystemApiKeyRepository>,
    pub oauth_states: Arc<dyn OAuthStateRepository>,
}

impl Repositories {
    /// PostgreSQL-backed repositories sharing one pool.
    pub fn postgres(pool: DbPool) -> Self {
        Self {
            users: Arc::new(PgUserRepo::new(pool.clone())),
            refresh_tokens: Arc::new(PgRefreshTokenRepo::new(pool.clone())),
            user_api_keys: Arc::new(PgUserApiKeyRepo::new(pool.clone())),
            system_api_keys: Arc::new(PgSystemApiKeyRepo::new(pool.clone())),
            oauth_states: Arc::new(PgOAuthStateRepo::new(pool)),
        }
    }

    /// Process-local repositories; state is lost on restart.
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(memory::MemoryUserRepo::new()),
            refresh_tokens: Arc::new(memory::MemoryRefreshTokenRepo::new()),
            user_api_keys: Arc::new(memory::MemoryUserApiKeyRepo::new()),
            system_api_keys: Arc::new(memory::MemorySystemApiKeyRepo::new()),
            oauth_states: Arc::new(memory::MemoryOAuthStateRepo::new()),
        }
    }
}

/// Create a connection pool from a database URL.
pub async fn create_pool(database_url: &str) -> Result<DbPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await
}

/// Verify that the database answers a trivial query.
pub async fn health_check(pool: &DbPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Apply the embedded SQL migrations.
pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
