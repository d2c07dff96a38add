//! In-process repository implementations.
//!
//! Each table is a `BTreeMap` behind a `tokio::sync::Mutex`, so every trait
//! method is one atomic read-modify-write. Uniqueness rules mirror the `uq_`
//! constraints of the SQL schema and surface as [`DbError::Conflict`].
//! Intended for tests and single-process deployments.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use idforge_core::types::{DbId, Timestamp};
use tokio::sync::Mutex;

use crate::error::{DbError, DbResult};
use crate::models::refresh_token::{CreateRefreshToken, RefreshToken};
use crate::models::system_api_key::{
    CreateSystemApiKey, SystemApiKey, UpdateSystemApiKey, UsageDelta,
};
use crate::models::user::{CreateUser, UpdateUserProfile, User};
use crate::models::user_api_key::{CreateUserApiKey, UserApiKey};
use crate::repositories::{
    OAuthStateRepository, RefreshTokenRepository, SystemApiKeyRepository, UserApiKeyRepository,
    UserRepository,
};

/// Rows plus a BIGSERIAL-style id sequence.
#[derive(Debug)]
struct Table<T> {
    last_id: DbId,
    rows: BTreeMap<DbId, T>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            last_id: 0,
            rows: BTreeMap::new(),
        }
    }
}

impl<T> Table<T> {
    fn next_id(&mut self) -> DbId {
        self.last_id += 1;
        self.last_id
    }
}

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryUserRepo {
    table: Mutex<Table<User>>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepo {
    async fn find_by_id(&self, id: DbId) -> DbResult<Option<User>> {
        Ok(self.table.lock().await.rows.get(&id).cloned())
    }

    async fn find_by_provider_identity(
        &self,
        provider: &str,
        provider_user_id: &str,
    ) -> DbResult<Option<User>> {
        let table = self.table.lock().await;
        Ok(table
            .rows
            .values()
            .find(|u| u.provider == provider && u.provider_user_id == provider_user_id)
            .cloned())
    }

    async fn create(&self, input: &CreateUser) -> DbResult<User> {
        let mut table = self.table.lock().await;
        let taken = table.rows.values().any(|u| {
            u.provider == input.provider && u.provider_user_id == input.provider_user_id
        });
        if taken {
            return Err(DbError::Conflict("uq_users_provider_identity".into()));
        }

        let now = Utc::now();
        let user = User {
            id: table.next_id(),
            email: input.email.clone(),
            name: input.name.clone(),
            avatar_url: input.avatar_url.clone(),
            provider: input.provider.clone(),
            provider_user_id: input.provider_user_id.clone(),
            email_verified: input.email_verified,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(user.id, user.clone());
        Ok(user)
    }

    async fn update_profile(
        &self,
        id: DbId,
        input: &UpdateUserProfile,
    ) -> DbResult<Option<User>> {
        let mut table = self.table.lock().await;
        Ok(table.rows.get_mut(&id).map(|user| {
            user.name = input.name.clone();
            user.avatar_url = input.avatar_url.clone();
            user.updated_at = Utc::now();
            user.clone()
        }))
    }
}

// ---------------------------------------------------------------------------
// Refresh tokens
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryRefreshTokenRepo {
    table: Mutex<Table<RefreshToken>>,
}

impl MemoryRefreshTokenRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RefreshTokenRepository for MemoryRefreshTokenRepo {
    async fn create(&self, input: &CreateRefreshToken) -> DbResult<RefreshToken> {
        let mut table = self.table.lock().await;
        if table.rows.values().any(|t| t.token_hash == input.token_hash) {
            return Err(DbError::Conflict("uq_refresh_tokens_token_hash".into()));
        }

        let token = RefreshToken {
            id: table.next_id(),
            user_id: input.user_id,
            token_hash: input.token_hash.clone(),
            expires_at: input.expires_at,
            created_at: Utc::now(),
            revoked_at: None,
            user_agent: input.user_agent.clone(),
            ip_address: input.ip_address.clone(),
        };
        table.rows.insert(token.id, token.clone());
        Ok(token)
    }

    async fn find_by_hash(&self, token_hash: &str) -> DbResult<Option<RefreshToken>> {
        let table = self.table.lock().await;
        Ok(table
            .rows
            .values()
            .find(|t| t.token_hash == token_hash)
            .cloned())
    }

    async fn list_by_user(&self, user_id: DbId) -> DbResult<Vec<RefreshToken>> {
        let table = self.table.lock().await;
        Ok(table
            .rows
            .values()
            .rev()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn revoke(&self, id: DbId, at: Timestamp) -> DbResult<bool> {
        let mut table = self.table.lock().await;
        match table.rows.get_mut(&id) {
            Some(token) if token.revoked_at.is_none() => {
                token.revoked_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke_all_for_user(&self, user_id: DbId, at: Timestamp) -> DbResult<u64> {
        let mut table = self.table.lock().await;
        let mut revoked = 0;
        for token in table.rows.values_mut() {
            if token.user_id == user_id && token.revoked_at.is_none() {
                token.revoked_at = Some(at);
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn delete_expired(&self, cutoff: Timestamp) -> DbResult<u64> {
        let mut table = self.table.lock().await;
        let before = table.rows.len();
        table.rows.retain(|_, t| t.expires_at >= cutoff);
        Ok((before - table.rows.len()) as u64)
    }
}

// ---------------------------------------------------------------------------
// User API keys
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryUserApiKeyRepo {
    table: Mutex<Table<UserApiKey>>,
}

impl MemoryUserApiKeyRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserApiKeyRepository for MemoryUserApiKeyRepo {
    async fn create(&self, input: &CreateUserApiKey) -> DbResult<UserApiKey> {
        let mut table = self.table.lock().await;
        let taken = table
            .rows
            .values()
            .any(|k| k.user_id == input.user_id && k.provider == input.provider);
        if taken {
            return Err(DbError::Conflict("uq_user_api_keys_user_provider".into()));
        }

        let now = Utc::now();
        let key = UserApiKey {
            id: table.next_id(),
            user_id: input.user_id,
            provider: input.provider.clone(),
            name: input.name.clone(),
            encrypted_key: input.encrypted_key.clone(),
            key_prefix: input.key_prefix.clone(),
            scopes: input.scopes.clone(),
            last_used_at: None,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(key.id, key.clone());
        Ok(key)
    }

    async fn find_by_id(&self, id: DbId) -> DbResult<Option<UserApiKey>> {
        Ok(self.table.lock().await.rows.get(&id).cloned())
    }

    async fn find_by_user_and_provider(
        &self,
        user_id: DbId,
        provider: &str,
    ) -> DbResult<Option<UserApiKey>> {
        let table = self.table.lock().await;
        Ok(table
            .rows
            .values()
            .find(|k| k.user_id == user_id && k.provider == provider)
            .cloned())
    }

    async fn list_by_user(&self, user_id: DbId) -> DbResult<Vec<UserApiKey>> {
        let table = self.table.lock().await;
        let mut keys: Vec<UserApiKey> = table
            .rows
            .values()
            .filter(|k| k.user_id == user_id)
            .cloned()
            .collect();
        keys.sort_by(|a, b| a.provider.cmp(&b.provider));
        Ok(keys)
    }

    async fn update_secret(
        &self,
        id: DbId,
        encrypted_key: &str,
        key_prefix: &str,
    ) -> DbResult<Option<UserApiKey>> {
        let mut table = self.table.lock().await;
        Ok(table.rows.get_mut(&id).map(|key| {
            key.encrypted_key = encrypted_key.to_string();
            key.key_prefix = key_prefix.to_string();
            key.updated_at = Utc::now();
            key.clone()
        }))
    }

    async fn update_last_used(&self, id: DbId, at: Timestamp) -> DbResult<bool> {
        let mut table = self.table.lock().await;
        match table.rows.get_mut(&id) {
            Some(key) => {
                key.last_used_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: DbId) -> DbResult<bool> {
        Ok(self.table.lock().await.rows.remove(&id).is_some())
    }
}

// ---------------------------------------------------------------------------
// System API keys
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemorySystemApiKeyRepo {
    table: Mutex<Table<SystemApiKey>>,
}

impl MemorySystemApiKeyRepo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SystemApiKeyRepository for MemorySystemApiKeyRepo {
    async fn create(&self, input: &CreateSystemApiKey) -> DbResult<SystemApiKey> {
        let mut table = self.table.lock().await;
        if table.rows.values().any(|k| k.key_hash == input.key_hash) {
            return Err(DbError::Conflict("uq_system_api_keys_key_hash".into()));
        }

        let now = Utc::now();
        let key = SystemApiKey {
            id: table.next_id(),
            user_id: input.user_id,
            name: input.name.clone(),
            key_hash: input.key_hash.clone(),
            key_prefix: input.key_prefix.clone(),
            scopes: input.scopes.clone(),
            rate_limit_rpm: input.rate_limit_rpm,
            rate_limit_tpm: input.rate_limit_tpm,
            total_requests: 0,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_cost_usd: 0.0,
            cache_hits: 0,
            cache_misses: 0,
            is_active: true,
            last_used_at: None,
            expires_at: input.expires_at,
            allowed_ips: input.allowed_ips.clone(),
            rotate_after_days: input.rotate_after_days,
            last_rotated_at: None,
            created_at: now,
            updated_at: now,
        };
        table.rows.insert(key.id, key.clone());
        Ok(key)
    }

    async fn find_by_id(&self, id: DbId) -> DbResult<Option<SystemApiKey>> {
        Ok(self.table.lock().await.rows.get(&id).cloned())
    }

    async fn find_by_hash(&self, key_hash: &str) -> DbResult<Option<SystemApiKey>> {
        let table = self.table.lock().await;
        Ok(table
            .rows
            .values()
            .find(|k| k.key_hash == key_hash)
            .cloned())
    }

    async fn list_by_user(&self, user_id: DbId) -> DbResult<Vec<SystemApiKey>> {
        let table = self.table.lock().await;
        Ok(table
            .rows
            .values()
            .rev()
            .filter(|k| k.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn count_by_user(&self, user_id: DbId) -> DbResult<i64> {
        let table = self.table.lock().await;
        Ok(table.rows.values().filter(|k| k.user_id == user_id).count() as i64)
    }

    async fn update(
        &self,
        id: DbId,
        input: &UpdateSystemApiKey,
    ) -> DbResult<Option<SystemApiKey>> {
        let mut table = self.table.lock().await;
        Ok(table.rows.get_mut(&id).map(|key| {
            if let Some(name) = &input.name {
                key.name = name.clone();
            }
            if let Some(scopes) = &input.scopes {
                key.scopes = scopes.clone();
            }
            if let Some(rpm) = input.rate_limit_rpm {
                key.rate_limit_rpm = rpm;
            }
            if let Some(tpm) = input.rate_limit_tpm {
                key.rate_limit_tpm = tpm;
            }
            if let Some(active) = input.is_active {
                key.is_active = active;
            }
            key.updated_at = Utc::now();
            key.clone()
        }))
    }

    async fn rotate(
        &self,
        id: DbId,
        key_hash: &str,
        key_prefix: &str,
        at: Timestamp,
    ) -> DbResult<Option<SystemApiKey>> {
        let mut table = self.table.lock().await;
        let clash = table
            .rows
            .iter()
            .any(|(other, k)| *other != id && k.key_hash == key_hash);
        if clash {
            return Err(DbError::Conflict("uq_system_api_keys_key_hash".into()));
        }

        Ok(table.rows.get_mut(&id).map(|key| {
            key.key_hash = key_hash.to_string();
            key.key_prefix = key_prefix.to_string();
            key.last_rotated_at = Some(at);
            key.updated_at = at;
            key.clone()
        }))
    }

    async fn update_last_used(&self, id: DbId, at: Timestamp) -> DbResult<bool> {
        let mut table = self.table.lock().await;
        match table.rows.get_mut(&id) {
            Some(key) => {
                key.last_used_at = Some(at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn record_usage(&self, id: DbId, delta: &UsageDelta) -> DbResult<bool> {
        let mut table = self.table.lock().await;
        let Some(key) = table.rows.get_mut(&id) else {
            return Ok(false);
        };
        key.total_requests = key.total_requests.saturating_add(delta.requests);
        key.total_input_tokens = key.total_input_tokens.saturating_add(delta.input_tokens);
        key.total_output_tokens = key.total_output_tokens.saturating_add(delta.output_tokens);
        key.total_cost_usd += delta.cost_usd;
        key.cache_hits = key.cache_hits.saturating_add(delta.cache_hits);
        key.cache_misses = key.cache_misses.saturating_add(delta.cache_misses);
        Ok(true)
    }

    async fn delete(&self, id: DbId) -> DbResult<bool> {
        Ok(self.table.lock().await.rows.remove(&id).is_some())
    }
}

// ---------------------------------------------------------------------------
// OAuth state
// ---------------------------------------------------------------------------

/// Concurrent map of `state -> (provider, deadline)`.
#[derive(Debug, Default)]
pub struct MemoryOAuthStateRepo {
    states: DashMap<String, (String, Timestamp)>,
}

impl MemoryOAuthStateRepo {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[async_trait]
impl OAuthStateRepository for MemoryOAuthStateRepo {
    async fn set(&self, state: &str, provider: &str, expires_at: Timestamp) -> DbResult<()> {
        self.states
            .insert(state.to_string(), (provider.to_string(), expires_at));
        Ok(())
    }

    async fn get(&self, state: &str) -> DbResult<Option<String>> {
        let now = Utc::now();
        Ok(self
            .states
            .get(state)
            .filter(|entry| entry.1 > now)
            .map(|entry| entry.0.clone()))
    }

    async fn delete(&self, state: &str) -> DbResult<bool> {
        Ok(self.states.remove(state).is_some())
    }

    async fn take(&self, state: &str) -> DbResult<Option<String>> {
        let now = Utc::now();
        Ok(self
            .states
            .remove(state)
            .and_then(|(_, (provider, expires_at))| (expires_at > now).then_some(provider)))
    }

    async fn purge_expired(&self, now: Timestamp) -> DbResult<u64> {
        let before = self.states.len();
        self.states.retain(|_, entry| entry.1 >= now);
        Ok(before.saturating_sub(self.states.len()) as u64)
    }
}
