//! User-supplied provider API keys, stored encrypted.
//!
//! A user holds at most one key per provider. Plaintext leaves this module
//! only through [`UserKeyManager::get_decrypted`].

use std::sync::Arc;

use chrono::Utc;
use idforge_core::api_keys::{display_prefix, USER_KEY_DISPLAY_PREFIX_LENGTH};
use idforge_core::crypto::SecretCodec;
use idforge_core::error::{CoreError, CoreResult};
use idforge_core::ownership::ensure_owner;
use idforge_core::types::DbId;
use idforge_db::models::user_api_key::{CreateUserApiKey, UserApiKey, UserApiKeyInfo};
use idforge_db::repositories::UserApiKeyRepository;
use serde::Deserialize;

use crate::usage::UsageTracker;

const ENTITY: &str = "UserApiKey";

/// Input for storing a provider key.
#[derive(Clone, Deserialize)]
pub struct CreateUserKey {
    pub provider: String,
    pub name: String,
    pub key: String,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for CreateUserKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateUserKey")
            .field("provider", &self.provider)
            .field("name", &self.name)
            .field("scopes", &self.scopes)
            .finish_non_exhaustive()
    }
}

/// Stores, rotates, and decrypts user provider keys.
#[derive(Clone)]
pub struct UserKeyManager {
    repo: Arc<dyn UserApiKeyRepository>,
    codec: Arc<dyn SecretCodec>,
    usage: UsageTracker,
}

impl UserKeyManager {
    pub fn new(
        repo: Arc<dyn UserApiKeyRepository>,
        codec: Arc<dyn SecretCodec>,
        usage: UsageTracker,
    ) -> Self {
        Self { repo, codec, usage }
    }

    /// Encrypt and store a key for `(user_id, provider)`.
    pub async fn create(&self, user_id: DbId, input: CreateUserKey) -> CoreResult<UserApiKeyInfo> {
        let provider = input.provider.trim().to_lowercase();
        if provider.is_empty() {
            return Err(CoreError::Validation("provider must not be empty".into()));
        }
        if input.key.is_empty() {
            return Err(CoreError::Validation("key must not be empty".into()));
        }

        if self
            .repo
            .find_by_user_and_provider(user_id, &provider)
            .await?
            .is_some()
        {
            return Err(CoreError::AlreadyExists(format!(
                "a key for provider '{provider}' is already stored"
            )));
        }

        let encrypted_key = self.codec.encrypt(&input.key)?;
        let mut scopes = input.scopes;
        scopes.sort();
        scopes.dedup();

        let name = match input.name.trim() {
            "" => provider.clone(),
            name => name.to_string(),
        };

        // The unique (user_id, provider) constraint closes the race with a
        // concurrent create; its conflict maps to AlreadyExists.
        let key = self
            .repo
            .create(&CreateUserApiKey {
                user_id,
                provider,
                name,
                encrypted_key,
                key_prefix: display_prefix(&input.key, USER_KEY_DISPLAY_PREFIX_LENGTH),
                scopes,
            })
            .await?;

        tracing::info!(user_id, key_id = key.id, provider = %key.provider, "User API key stored");
        Ok(key.into())
    }

    /// Replace the stored secret of an owned key.
    ///
    /// On encryption failure the stored key is left untouched.
    pub async fn rotate(
        &self,
        user_id: DbId,
        key_id: DbId,
        new_key: &str,
    ) -> CoreResult<UserApiKeyInfo> {
        if new_key.is_empty() {
            return Err(CoreError::Validation("key must not be empty".into()));
        }

        let key = self.owned(user_id, key_id).await?;
        let encrypted_key = self.codec.encrypt(new_key)?;
        let key_prefix = display_prefix(new_key, USER_KEY_DISPLAY_PREFIX_LENGTH);

        let updated = self
            .repo
            .update_secret(key.id, &encrypted_key, &key_prefix)
            .await?
            .ok_or_else(|| CoreError::not_found(ENTITY))?;

        tracing::info!(user_id, key_id, "User API key rotated");
        Ok(updated.into())
    }

    /// Delete an owned key.
    pub async fn delete(&self, user_id: DbId, key_id: DbId) -> CoreResult<()> {
        let key = self.owned(user_id, key_id).await?;
        if !self.repo.delete(key.id).await? {
            return Err(CoreError::not_found(ENTITY));
        }
        tracing::info!(user_id, key_id, "User API key deleted");
        Ok(())
    }

    /// Decrypt the key stored for `(user_id, provider)`.
    ///
    /// Records last-used in the background.
    pub async fn get_decrypted(&self, user_id: DbId, provider: &str) -> CoreResult<String> {
        let provider = provider.trim().to_lowercase();
        let key = self
            .repo
            .find_by_user_and_provider(user_id, &provider)
            .await?
            .ok_or_else(|| CoreError::not_found(ENTITY))?;

        let plaintext = self.codec.decrypt(&key.encrypted_key)?;

        let repo = Arc::clone(&self.repo);
        let key_id = key.id;
        self.usage.spawn("user_api_key.last_used", async move {
            repo.update_last_used(key_id, Utc::now()).await
        });

        Ok(plaintext)
    }

    /// Metadata of every key owned by `user_id`.
    pub async fn list(&self, user_id: DbId) -> CoreResult<Vec<UserApiKeyInfo>> {
        let keys = self.repo.list_by_user(user_id).await?;
        Ok(keys.into_iter().map(UserApiKeyInfo::from).collect())
    }

    async fn owned(&self, user_id: DbId, key_id: DbId) -> CoreResult<UserApiKey> {
        let key = self
            .repo
            .find_by_id(key_id)
            .await?
            .ok_or_else(|| CoreError::not_found(ENTITY))?;
        ensure_owner(&key, user_id, ENTITY)?;
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use idforge_core::crypto::AesGcmCodec;
    use idforge_db::memory::MemoryUserApiKeyRepo;

    fn manager() -> (UserKeyManager, Arc<MemoryUserApiKeyRepo>) {
        let repo = Arc::new(MemoryUserApiKeyRepo::new());
        let codec = Arc::new(AesGcmCodec::new(&[7u8; 32]).unwrap());
        (
            UserKeyManager::new(repo.clone(), codec, UsageTracker::default()),
            repo,
        )
    }

    fn openai(key: &str) -> CreateUserKey {
        CreateUserKey {
            provider: "openai".into(),
            name: "personal".into(),
            key: key.into(),
            scopes: vec!["chat".into(), "chat".into()],
        }
    }

    #[tokio::test]
    async fn stored_key_is_encrypted_with_short_prefix() {
        let (manager, repo) = manager();
        let raw = "sk-proj-abcdef0123456789";
        let info = manager.create(1, openai(raw)).await.unwrap();

        assert_eq!(info.key_prefix, "sk-proj");
        assert_eq!(info.scopes, vec!["chat".to_string()]);

        let row = repo.find_by_id(info.id).await.unwrap().unwrap();
        assert_ne!(row.encrypted_key, raw);
        assert!(!row.encrypted_key.contains(raw));
    }

    #[tokio::test]
    async fn decrypts_original_plaintext() {
        let (manager, _) = manager();
        manager.create(1, openai("sk-ant-api03-secret")).await.unwrap();
        assert_eq!(
            manager.get_decrypted(1, "OpenAI").await.unwrap(),
            "sk-ant-api03-secret"
        );
    }

    #[tokio::test]
    async fn blank_name_defaults_to_provider() {
        let (manager, _) = manager();
        let mut input = openai("sk-1234567890");
        input.name = "  ".into();
        assert_eq!(manager.create(1, input).await.unwrap().name, "openai");
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let (manager, _) = manager();
        assert_matches!(
            manager.create(1, openai("")).await,
            Err(CoreError::Validation(_))
        );
    }

    #[tokio::test]
    async fn get_decrypted_records_last_used() {
        let (manager, repo) = manager();
        let info = manager.create(1, openai("sk-1234567890")).await.unwrap();

        manager.get_decrypted(1, "openai").await.unwrap();
        manager.usage.flush().await;

        let row = repo.find_by_id(info.id).await.unwrap().unwrap();
        assert!(row.last_used_at.is_some());
    }

    #[tokio::test]
    async fn list_returns_only_own_keys() {
        let (manager, _) = manager();
        manager.create(1, openai("sk-aaaaaaaaaa")).await.unwrap();
        manager.create(2, openai("sk-bbbbbbbbbb")).await.unwrap();

        let listed = manager.list(1).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].key_prefix, "sk-aaaa");
    }
}
