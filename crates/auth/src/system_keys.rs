//! System-issued API keys: lifecycle, validation, and usage accounting.
//!
//! Only the hash of a key is stored. The plaintext is returned once, from
//! [`SystemKeyManager::create`] or [`SystemKeyManager::rotate`].

use std::net::IpAddr;
use std::sync::Arc;

use chrono::{Duration, Utc};
use idforge_core::api_keys::{
    generate_api_key, is_well_formed, DEFAULT_RATE_LIMIT_RPM, DEFAULT_RATE_LIMIT_TPM,
};
use idforge_core::crypto::SecretCodec;
use idforge_core::error::{CoreError, CoreResult};
use idforge_core::ownership::ensure_owner;
use idforge_core::scopes;
use idforge_core::types::DbId;
use idforge_db::models::system_api_key::{
    CreateSystemApiKey, SystemApiKey, UpdateSystemApiKey, UsageDelta,
};
use idforge_db::repositories::SystemApiKeyRepository;
use serde::{Deserialize, Serialize};

use crate::usage::UsageTracker;

const ENTITY: &str = "SystemApiKey";

/// Default ceiling on keys per user.
pub const DEFAULT_MAX_KEYS_PER_USER: i64 = 5;

/// Input for issuing a system key. Omitted fields take defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateSystemKey {
    pub name: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub rate_limit_rpm: Option<i32>,
    #[serde(default)]
    pub rate_limit_tpm: Option<i32>,
    /// Days until expiry; `None` never expires.
    #[serde(default)]
    pub expires_in_days: Option<i64>,
    #[serde(default)]
    pub allowed_ips: Vec<String>,
    #[serde(default)]
    pub rotate_after_days: Option<i32>,
}

/// A key together with its one-time plaintext.
#[derive(Clone, Serialize)]
pub struct IssuedSystemKey {
    pub key: SystemApiKey,
    pub plaintext: String,
}

impl std::fmt::Debug for IssuedSystemKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IssuedSystemKey")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

/// Issues and validates system API keys.
#[derive(Clone)]
pub struct SystemKeyManager {
    repo: Arc<dyn SystemApiKeyRepository>,
    codec: Arc<dyn SecretCodec>,
    usage: UsageTracker,
    max_keys_per_user: i64,
}

impl SystemKeyManager {
    pub fn new(
        repo: Arc<dyn SystemApiKeyRepository>,
        codec: Arc<dyn SecretCodec>,
        usage: UsageTracker,
        max_keys_per_user: i64,
    ) -> Self {
        Self {
            repo,
            codec,
            usage,
            max_keys_per_user,
        }
    }

    /// Issue a new key for `user_id`.
    ///
    /// The per-user ceiling is checked before anything else. The count and
    /// insert are not atomic, so concurrent creates may overshoot it.
    pub async fn create(&self, user_id: DbId, input: CreateSystemKey) -> CoreResult<IssuedSystemKey> {
        let existing = self.repo.count_by_user(user_id).await?;
        if existing >= self.max_keys_per_user {
            return Err(CoreError::LimitExceeded(format!(
                "at most {} API keys per user",
                self.max_keys_per_user
            )));
        }

        let scopes = scopes::resolve(&input.scopes)?;
        let name = validate_name(&input.name)?;
        let rate_limit_rpm = positive("rate_limit_rpm", input.rate_limit_rpm)?;
        let rate_limit_tpm = positive("rate_limit_tpm", input.rate_limit_tpm)?;
        let rotate_after_days = positive("rotate_after_days", input.rotate_after_days)?;
        let allowed_ips = validate_ips(input.allowed_ips)?;
        let expires_at = match input.expires_in_days {
            Some(days) if days <= 0 => {
                return Err(CoreError::Validation("expires_in_days must be positive".into()))
            }
            Some(days) => Some(
                Duration::try_days(days)
                    .and_then(|d| Utc::now().checked_add_signed(d))
                    .ok_or_else(|| CoreError::Validation("expires_in_days out of range".into()))?,
            ),
            None => None,
        };

        let generated = generate_api_key(self.codec.as_ref());
        let key = self
            .repo
            .create(&CreateSystemApiKey {
                user_id,
                name,
                key_hash: generated.hash,
                key_prefix: generated.prefix,
                scopes: scopes.into_iter().collect(),
                rate_limit_rpm: rate_limit_rpm.unwrap_or(DEFAULT_RATE_LIMIT_RPM),
                rate_limit_tpm: rate_limit_tpm.unwrap_or(DEFAULT_RATE_LIMIT_TPM),
                expires_at,
                allowed_ips,
                rotate_after_days,
            })
            .await?;

        tracing::info!(user_id, key_id = key.id, prefix = %key.key_prefix, "System API key created");

        Ok(IssuedSystemKey {
            key,
            plaintext: generated.plaintext,
        })
    }

    /// Update owner-editable fields of an owned key.
    ///
    /// Replacement scopes are resolved like on create; an empty list resets
    /// them to the defaults.
    pub async fn update(
        &self,
        user_id: DbId,
        key_id: DbId,
        input: UpdateSystemApiKey,
    ) -> CoreResult<SystemApiKey> {
        let key = self.owned(user_id, key_id).await?;

        let changes = UpdateSystemApiKey {
            name: input.name.as_deref().map(validate_name).transpose()?,
            scopes: input
                .scopes
                .as_deref()
                .map(scopes::resolve)
                .transpose()?
                .map(|set| set.into_iter().collect()),
            rate_limit_rpm: positive("rate_limit_rpm", input.rate_limit_rpm)?,
            rate_limit_tpm: positive("rate_limit_tpm", input.rate_limit_tpm)?,
            is_active: input.is_active,
        };

        let updated = self
            .repo
            .update(key.id, &changes)
            .await?
            .ok_or_else(|| CoreError::not_found(ENTITY))?;

        tracing::info!(user_id, key_id, is_active = updated.is_active, "System API key updated");
        Ok(updated)
    }

    /// Delete an owned key.
    pub async fn delete(&self, user_id: DbId, key_id: DbId) -> CoreResult<()> {
        let key = self.owned(user_id, key_id).await?;
        if !self.repo.delete(key.id).await? {
            return Err(CoreError::not_found(ENTITY));
        }
        tracing::info!(user_id, key_id, "System API key deleted");
        Ok(())
    }

    /// Replace the key material of an owned key. The old plaintext stops
    /// validating immediately.
    pub async fn rotate(&self, user_id: DbId, key_id: DbId) -> CoreResult<IssuedSystemKey> {
        let key = self.owned(user_id, key_id).await?;
        let generated = generate_api_key(self.codec.as_ref());

        let key = self
            .repo
            .rotate(key.id, &generated.hash, &generated.prefix, Utc::now())
            .await?
            .ok_or_else(|| CoreError::not_found(ENTITY))?;

        tracing::info!(user_id, key_id, prefix = %key.key_prefix, "System API key rotated");

        Ok(IssuedSystemKey {
            key,
            plaintext: generated.plaintext,
        })
    }

    /// Resolve a presented raw key to an active, unexpired key.
    ///
    /// Records last-used in the background.
    pub async fn validate(&self, raw_key: &str) -> CoreResult<SystemApiKey> {
        if !is_well_formed(raw_key) {
            return Err(CoreError::InvalidApiKeyFormat);
        }

        let key = self
            .repo
            .find_by_hash(&self.codec.hash(raw_key))
            .await?
            .ok_or_else(|| CoreError::not_found(ENTITY))?;

        if !key.is_active {
            return Err(CoreError::Disabled);
        }
        if key.is_expired(Utc::now()) {
            return Err(CoreError::Expired);
        }

        let repo = Arc::clone(&self.repo);
        let key_id = key.id;
        self.usage.spawn("system_api_key.last_used", async move {
            repo.update_last_used(key_id, Utc::now()).await
        });

        Ok(key)
    }

    /// [`validate`](Self::validate) plus scope and client-address checks.
    pub async fn authorize(
        &self,
        raw_key: &str,
        scope: Option<&str>,
        client_ip: Option<IpAddr>,
    ) -> CoreResult<SystemApiKey> {
        let key = self.validate(raw_key).await?;

        if let Some(scope) = scope {
            if !key.has_scope(scope) {
                return Err(CoreError::Forbidden(format!("API key lacks scope '{scope}'")));
            }
        }

        if let Some(ip) = client_ip {
            if !key.allows_ip(ip) {
                tracing::warn!(key_id = key.id, %ip, "API key used from disallowed address");
                return Err(CoreError::Forbidden("client address not allowed".into()));
            }
        }

        if key.needs_rotation(Utc::now()) {
            tracing::debug!(key_id = key.id, "API key is due for rotation");
        }

        Ok(key)
    }

    /// Add usage reported by the consuming subsystem.
    pub async fn record_usage(&self, key_id: DbId, delta: &UsageDelta) -> CoreResult<()> {
        if delta.requests < 0
            || delta.input_tokens < 0
            || delta.output_tokens < 0
            || delta.cache_hits < 0
            || delta.cache_misses < 0
            || delta.cost_usd < 0.0
            || !delta.cost_usd.is_finite()
        {
            return Err(CoreError::Validation("usage deltas must be non-negative".into()));
        }

        if !self.repo.record_usage(key_id, delta).await? {
            return Err(CoreError::not_found(ENTITY));
        }
        Ok(())
    }

    /// Every key of `user_id`, newest first.
    pub async fn list(&self, user_id: DbId) -> CoreResult<Vec<SystemApiKey>> {
        Ok(self.repo.list_by_user(user_id).await?)
    }

    /// A single owned key.
    pub async fn get(&self, user_id: DbId, key_id: DbId) -> CoreResult<SystemApiKey> {
        self.owned(user_id, key_id).await
    }

    async fn owned(&self, user_id: DbId, key_id: DbId) -> CoreResult<SystemApiKey> {
        let key = self
            .repo
            .find_by_id(key_id)
            .await?
            .ok_or_else(|| CoreError::not_found(ENTITY))?;
        ensure_owner(&key, user_id, ENTITY)?;
        Ok(key)
    }
}

fn validate_name(name: &str) -> CoreResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(CoreError::Validation("name must not be empty".into()));
    }
    Ok(name.to_string())
}

fn positive(field: &str, value: Option<i32>) -> CoreResult<Option<i32>> {
    match value {
        Some(v) if v <= 0 => Err(CoreError::Validation(format!("{field} must be positive"))),
        other => Ok(other),
    }
}

fn validate_ips(entries: Vec<String>) -> CoreResult<Vec<String>> {
    entries
        .into_iter()
        .map(|entry| {
            entry
                .trim()
                .parse::<IpAddr>()
                .map(|ip| ip.to_string())
                .map_err(|_| CoreError::Validation(format!("invalid IP address '{}'", entry.trim())))
        })
        .collect()
}
