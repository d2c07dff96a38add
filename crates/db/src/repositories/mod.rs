//! Repository layer.
//!
//! Each repository is an async trait (the contract the credential services
//! depend on) plus a PostgreSQL implementation holding a [`sqlx::PgPool`].
//! In-process implementations live in [`crate::memory`].

pub mod oauth_state_repo;
pub mod refresh_token_repo;
pub mod system_api_key_repo;
pub mod user_api_key_repo;
pub mod user_repo;

pub use oauth_state_repo::{OAuthStateRepository, PgOAuthStateRepo};
pub use refresh_token_repo::{PgRefreshTokenRepo, RefreshTokenRepository};
pub use system_api_key_repo::{PgSystemApiKeyRepo, SystemApiKeyRepository};
pub use user_api_key_repo::{PgUserApiKeyRepo, UserApiKeyRepository};
pub use user_repo::{PgUserRepo, UserRepository};
