//! Entity models and DTOs.
//!
//! Each model derives `sqlx::FromRow` so PostgreSQL rows map directly onto it.
//! Secret-bearing columns are never serialized.

pub mod refresh_token;
pub mod system_api_key;
pub mod user;
pub mod user_api_key;
