//! Shared fixtures: in-memory repositories, a scripted identity provider,
//! and a codec that always fails.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use idforge_auth::jwt::JwtConfig;
use idforge_auth::oauth::{
    OAuthProvider, ProviderError, ProviderRegistry, ProviderToken, ProviderUserInfo,
};
use idforge_auth::{AuthConfig, CredentialServices};
use idforge_core::crypto::{AesGcmCodec, SecretCodec};
use idforge_core::error::{CoreError, CoreResult};
use idforge_core::hashing::secret_digest;
use idforge_db::Repositories;

/// Code accepted by [`FakeProvider::exchange`].
pub const GOOD_CODE: &str = "good-code";
/// Code whose token makes [`FakeProvider::user_info`] fail.
pub const PROFILE_FAIL_CODE: &str = "profile-fail";

/// Identity provider answering from a fixed profile.
pub struct FakeProvider {
    pub name: &'static str,
    pub profile: ProviderUserInfo,
}

impl FakeProvider {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            profile: ProviderUserInfo {
                external_id: "ext-42".into(),
                email: "ada@example.com".into(),
                name: "Ada Lovelace".into(),
                avatar_url: Some("https://example.com/ada.png".into()),
            },
        }
    }
}

#[async_trait]
impl OAuthProvider for FakeProvider {
    fn name(&self) -> &str {
        self.name
    }

    fn auth_url(&self, state: &str) -> String {
        format!("https://{}.test/authorize?state={state}", self.name)
    }

    async fn exchange(&self, code: &str) -> Result<ProviderToken, ProviderError> {
        match code {
            GOOD_CODE | PROFILE_FAIL_CODE => Ok(ProviderToken {
                access_token: code.to_string(),
                token_type: Some("bearer".into()),
            }),
            _ => Err(ProviderError::Rejected("bad_verification_code".into())),
        }
    }

    async fn user_info(&self, token: &ProviderToken) -> Result<ProviderUserInfo, ProviderError> {
        if token.access_token == PROFILE_FAIL_CODE {
            return Err(ProviderError::Status(502));
        }
        Ok(self.profile.clone())
    }
}

/// Codec whose encryption and decryption always fail.
pub struct FailingCodec;

impl SecretCodec for FailingCodec {
    fn hash(&self, raw: &str) -> String {
        secret_digest(raw)
    }

    fn encrypt(&self, _plaintext: &str) -> CoreResult<String> {
        Err(CoreError::EncryptionFailed)
    }

    fn decrypt(&self, _ciphertext: &str) -> CoreResult<String> {
        Err(CoreError::DecryptionFailed)
    }
}

pub fn config() -> AuthConfig {
    AuthConfig {
        jwt: JwtConfig {
            secret: "integration-secret-that-is-long-enough".into(),
            access_token_expiry_mins: 15,
            refresh_token_expiry_days: 7,
        },
        encryption_key: String::new(),
        oauth_state_ttl_secs: 600,
        max_system_keys_per_user: 5,
        usage_update_timeout: Duration::from_millis(500),
        providers: Vec::new(),
    }
}

pub fn codec() -> Arc<dyn SecretCodec> {
    Arc::new(AesGcmCodec::new(&[9u8; 32]).expect("32-byte key"))
}

pub fn registry(provider: FakeProvider) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(provider));
    registry
}

/// Services over fresh in-memory repositories with a `"fake"` provider.
pub fn services() -> (CredentialServices, Repositories) {
    services_with_codec(codec())
}

pub fn services_with_codec(codec: Arc<dyn SecretCodec>) -> (CredentialServices, Repositories) {
    let repos = Repositories::in_memory();
    let services = CredentialServices::assemble(
        &config(),
        repos.clone(),
        registry(FakeProvider::new("fake")),
        codec,
    );
    (services, repos)
}
