//! User entity model and DTOs.

use idforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `users` table.
///
/// Users are created from a federated identity; `(provider, provider_user_id)`
/// is unique.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct User {
    pub id: DbId,
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub provider: String,
    pub provider_user_id: String,
    pub email_verified: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for creating a new user.
#[derive(Debug, Clone)]
pub struct CreateUser {
    pub email: String,
    pub name: String,
    pub avatar_url: Option<String>,
    pub provider: String,
    pub provider_user_id: String,
    pub email_verified: bool,
}

/// Mutable display fields synced from the identity provider on each login.
#[derive(Debug, Clone)]
pub struct UpdateUserProfile {
    pub name: String,
    pub avatar_url: Option<String>,
}
