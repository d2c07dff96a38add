//! Refresh token model and DTOs.

use idforge_core::ownership::Owned;
use idforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `refresh_tokens` table.
///
/// Only the SHA-256 digest of the raw bearer value is stored.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct RefreshToken {
    pub id: DbId,
    pub user_id: DbId,
    #[serde(skip_serializing)]
    pub token_hash: String,
    pub expires_at: Timestamp,
    pub created_at: Timestamp,
    pub revoked_at: Option<Timestamp>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

impl RefreshToken {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    /// A token is valid iff it is not revoked and `now < expires_at`.
    pub fn is_valid(&self, now: Timestamp) -> bool {
        !self.is_revoked() && !self.is_expired(now)
    }
}

impl Owned for RefreshToken {
    fn owner_id(&self) -> DbId {
        self.user_id
    }
}

/// DTO for persisting a freshly issued refresh token.
#[derive(Debug, Clone)]
pub struct CreateRefreshToken {
    pub user_id: DbId,
    pub token_hash: String,
    pub expires_at: Timestamp,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn token(expires_in: Duration, revoked: bool) -> RefreshToken {
        let now = Utc::now();
        RefreshToken {
            id: 1,
            user_id: 1,
            token_hash: "h".into(),
            expires_at: now + expires_in,
            created_at: now,
            revoked_at: revoked.then_some(now),
            user_agent: None,
            ip_address: None,
        }
    }

    #[test]
    fn validity_requires_unrevoked_and_unexpired() {
        let now = Utc::now();
        assert!(token(Duration::hours(1), false).is_valid(now));
        assert!(!token(Duration::hours(1), true).is_valid(now));
        assert!(!token(Duration::seconds(-1), false).is_valid(now));
    }
}
