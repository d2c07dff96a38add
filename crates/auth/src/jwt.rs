//! JWT access-token generation/validation and refresh-token helpers.
//!
//! Access tokens are HS256-signed JWTs containing a [`Claims`] payload.
//! Refresh tokens are opaque random strings; only their SHA-256 hash is stored
//! server-side so a database leak does not compromise active sessions.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use idforge_core::error::{CoreError, CoreResult};
use idforge_core::hashing::secret_digest;
use idforge_core::types::{DbId, Timestamp};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bytes of randomness in a refresh token (256 bits).
const REFRESH_TOKEN_BYTES: usize = 32;

/// JWT claims embedded in every access token.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Claims {
    /// Subject -- the user's internal database id.
    pub sub: DbId,
    pub email: String,
    /// Expiration time (UTC Unix timestamp).
    pub exp: i64,
    /// Issued-at time (UTC Unix timestamp).
    pub iat: i64,
    /// Unique token identifier (UUID v4) for audit.
    pub jti: String,
}

/// Configuration for JWT token generation and validation.
#[derive(Clone)]
pub struct JwtConfig {
    /// HMAC-SHA256 secret used to sign and verify tokens.
    pub secret: String,
    /// Access token lifetime in minutes (default: 15).
    pub access_token_expiry_mins: i64,
    /// Refresh token lifetime in days (default: 7).
    pub refresh_token_expiry_days: i64,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("secret", &"<redacted>")
            .field("access_token_expiry_mins", &self.access_token_expiry_mins)
            .field("refresh_token_expiry_days", &self.refresh_token_expiry_days)
            .finish()
    }
}

/// A signed access token and its validity window.
#[derive(Clone)]
pub struct AccessToken {
    pub token: String,
    pub issued_at: Timestamp,
    pub expires_at: Timestamp,
}

impl AccessToken {
    /// Lifetime in whole seconds.
    pub fn expires_in(&self) -> i64 {
        (self.expires_at - self.issued_at).num_seconds()
    }
}

/// A freshly minted refresh token. Only `hash` is persisted.
#[derive(Clone)]
pub struct GeneratedRefreshToken {
    pub raw: String,
    pub hash: String,
    pub expires_at: Timestamp,
}

impl std::fmt::Debug for GeneratedRefreshToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedRefreshToken")
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Mints and verifies session tokens.
pub trait TokenGenerator: Send + Sync {
    fn generate_access_token(&self, user_id: DbId, email: &str) -> CoreResult<AccessToken>;

    fn generate_refresh_token(&self) -> GeneratedRefreshToken;

    /// Verify signature and expiry, returning the embedded claims.
    fn validate_access_token(&self, token: &str) -> CoreResult<Claims>;
}

/// HS256 implementation of [`TokenGenerator`].
#[derive(Debug, Clone)]
pub struct JwtTokenGenerator {
    config: JwtConfig,
}

impl JwtTokenGenerator {
    pub fn new(config: JwtConfig) -> Self {
        Self { config }
    }
}

impl TokenGenerator for JwtTokenGenerator {
    fn generate_access_token(&self, user_id: DbId, email: &str) -> CoreResult<AccessToken> {
        let issued_at = Utc::now();
        let expires_at = issued_at + Duration::minutes(self.config.access_token_expiry_mins);

        let claims = Claims {
            sub: user_id,
            email: email.to_string(),
            exp: expires_at.timestamp(),
            iat: issued_at.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let token = encode(
            &Header::default(), // HS256
            &claims,
            &EncodingKey::from_secret(self.config.secret.as_bytes()),
        )
        .map_err(|e| {
            tracing::error!(error = %e, user_id, "Failed to sign access token");
            CoreError::Internal("failed to sign access token".into())
        })?;

        Ok(AccessToken {
            token,
            issued_at,
            expires_at,
        })
    }

    fn generate_refresh_token(&self) -> GeneratedRefreshToken {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        rand::rng().fill(&mut bytes);
        let raw = URL_SAFE_NO_PAD.encode(bytes);
        let hash = hash_refresh_token(&raw);

        GeneratedRefreshToken {
            raw,
            hash,
            expires_at: Utc::now() + Duration::days(self.config.refresh_token_expiry_days),
        }
    }

    fn validate_access_token(&self, token: &str) -> CoreResult<Claims> {
        let mut validation = Validation::default(); // HS256, validates exp
        validation.leeway = 0;

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => CoreError::ExpiredToken,
            _ => CoreError::InvalidToken,
        })
    }
}

/// Compute the SHA-256 hex digest of a refresh token.
///
/// Use this to compare an incoming refresh token against the stored hash.
pub fn hash_refresh_token(token: &str) -> String {
    secret_digest(token)
}
