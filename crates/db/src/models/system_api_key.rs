//! System-issued API key model and DTOs.

use std::net::IpAddr;

use chrono::Duration;
use idforge_core::ownership::Owned;
use idforge_core::types::{DbId, Timestamp};
use serde::Serialize;
use sqlx::FromRow;

/// A row from the `system_api_keys` table.
///
/// **Note:** `key_hash` is never serialized. The raw key is shown to the owner
/// once at creation/rotation and cannot be recovered afterwards.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct SystemApiKey {
    pub id: DbId,
    pub user_id: DbId,
    pub name: String,
    #[serde(skip_serializing)]
    pub key_hash: String,
    pub key_prefix: String,
    pub scopes: Vec<String>,
    pub rate_limit_rpm: i32,
    pub rate_limit_tpm: i32,
    pub total_requests: i64,
    pub total_input_tokens: i64,
    pub total_output_tokens: i64,
    pub total_cost_usd: f64,
    pub cache_hits: i64,
    pub cache_misses: i64,
    pub is_active: bool,
    pub last_used_at: Option<Timestamp>,
    pub expires_at: Option<Timestamp>,
    /// Empty means any address is allowed.
    pub allowed_ips: Vec<String>,
    /// Rotation policy hint; not enforced by the key itself.
    pub rotate_after_days: Option<i32>,
    pub last_rotated_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl SystemApiKey {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    /// Validity = active and (no expiry or `now < expires_at`).
    pub fn is_valid(&self, now: Timestamp) -> bool {
        self.is_active && !self.is_expired(now)
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }

    /// Whether a request from `ip` passes the allow-list.
    ///
    /// Entries are exact addresses; unparsable entries never match.
    pub fn allows_ip(&self, ip: IpAddr) -> bool {
        self.allowed_ips.is_empty()
            || self
                .allowed_ips
                .iter()
                .filter_map(|entry| entry.trim().parse::<IpAddr>().ok())
                .any(|allowed| allowed == ip)
    }

    /// Whether the rotation policy says this key is due for rotation.
    pub fn needs_rotation(&self, now: Timestamp) -> bool {
        match self.rotate_after_days {
            Some(days) if days > 0 => {
                let since = self.last_rotated_at.unwrap_or(self.created_at);
                now - since >= Duration::days(i64::from(days))
            }
            _ => false,
        }
    }
}

impl Owned for SystemApiKey {
    fn owner_id(&self) -> DbId {
        self.user_id
    }
}

/// DTO for inserting a new system API key. Counters start at zero.
#[derive(Debug, Clone)]
pub struct CreateSystemApiKey {
    pub user_id: DbId,
    pub name: String,
    pub key_hash: String,
    pub key_prefix: String,
    pub scopes: Vec<String>,
    pub rate_limit_rpm: i32,
    pub rate_limit_tpm: i32,
    pub expires_at: Option<Timestamp>,
    pub allowed_ips: Vec<String>,
    pub rotate_after_days: Option<i32>,
}

/// Partial update of owner-editable fields. `None` leaves a field untouched.
#[derive(Debug, Clone, Default)]
pub struct UpdateSystemApiKey {
    pub name: Option<String>,
    pub scopes: Option<Vec<String>>,
    pub rate_limit_rpm: Option<i32>,
    pub rate_limit_tpm: Option<i32>,
    pub is_active: Option<bool>,
}

/// Usage reported by the consuming subsystem for one or more requests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UsageDelta {
    pub requests: i64,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost_usd: f64,
    pub cache_hits: i64,
    pub cache_misses: i64,
}
