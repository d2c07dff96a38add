//! User-held provider API key model and DTOs.

use idforge_core::ownership::Owned;
use idforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `user_api_keys` table.
///
/// `encrypted_key` is AES-256-GCM ciphertext and is skipped during
/// serialization; `key_prefix` is the display-only hint.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct UserApiKey {
    pub id: DbId,
    pub user_id: DbId,
    pub provider: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub encrypted_key: String,
    pub key_prefix: String,
    pub scopes: Vec<String>,
    pub last_used_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Owned for UserApiKey {
    fn owner_id(&self) -> DbId {
        self.user_id
    }
}

/// Owner-facing view of a stored key (never exposes the ciphertext).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserApiKeyInfo {
    pub id: DbId,
    pub provider: String,
    pub name: String,
    pub key_prefix: String,
    pub scopes: Vec<String>,
    pub last_used_at: Option<Timestamp>,
    pub created_at: Timestamp,
}

impl From<UserApiKey> for UserApiKeyInfo {
    fn from(key: UserApiKey) -> Self {
        Self {
            id: key.id,
            provider: key.provider,
            name: key.name,
            key_prefix: key.key_prefix,
            scopes: key.scopes,
            last_used_at: key.last_used_at,
            created_at: key.created_at,
        }
    }
}

/// DTO for creating a user API key. The key is already encrypted.
#[derive(Debug, Clone)]
pub struct CreateUserApiKey {
    pub user_id: DbId,
    pub provider: String,
    pub name: String,
    pub encrypted_key: String,
    pub key_prefix: String,
    pub scopes: Vec<String>,
}
