/// Errors produced by credential operations.
///
/// Every variant maps to a stable machine-readable code via [`CoreError::code`];
/// the `Display` output is the human-readable message. Messages never carry
/// secret material (raw keys, ciphertext, token hashes).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Unsupported OAuth provider: {0}")]
    InvalidProvider(String),

    #[error("Invalid or expired OAuth state")]
    InvalidOAuthState,

    #[error("Invalid OAuth authorization code")]
    InvalidOAuthCode,

    #[error("OAuth provider request failed: {0}")]
    OAuthFailed(String),

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    ExpiredToken,

    #[error("Token has been revoked")]
    RevokedToken,

    #[error("Entity not found: {entity}")]
    NotFound { entity: &'static str },

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Failed to encrypt secret")]
    EncryptionFailed,

    #[error("Failed to decrypt secret")]
    DecryptionFailed,

    #[error("Malformed API key")]
    InvalidApiKeyFormat,

    #[error("Unknown API key scope: {0}")]
    InvalidApiKeyScope(String),

    #[error("API key is disabled")]
    Disabled,

    #[error("API key has expired")]
    Expired,

    #[error("Limit exceeded: {0}")]
    LimitExceeded(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience alias for results carrying a [`CoreError`].
pub type CoreResult<T> = Result<T, CoreError>;

impl CoreError {
    /// Stable machine-readable code for the boundary layer.
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::InvalidProvider(_) => "INVALID_PROVIDER",
            CoreError::InvalidOAuthState => "INVALID_OAUTH_STATE",
            CoreError::InvalidOAuthCode => "INVALID_OAUTH_CODE",
            CoreError::OAuthFailed(_) => "OAUTH_FAILED",
            CoreError::InvalidToken => "INVALID_TOKEN",
            CoreError::ExpiredToken => "EXPIRED_TOKEN",
            CoreError::RevokedToken => "REVOKED_TOKEN",
            CoreError::NotFound { .. } => "NOT_FOUND",
            CoreError::AlreadyExists(_) => "ALREADY_EXISTS",
            CoreError::Forbidden(_) => "FORBIDDEN",
            CoreError::EncryptionFailed => "ENCRYPTION_FAILED",
            CoreError::DecryptionFailed => "DECRYPTION_FAILED",
            CoreError::InvalidApiKeyFormat => "INVALID_API_KEY_FORMAT",
            CoreError::InvalidApiKeyScope(_) => "INVALID_API_KEY_SCOPE",
            CoreError::Disabled => "API_KEY_DISABLED",
            CoreError::Expired => "API_KEY_EXPIRED",
            CoreError::LimitExceeded(_) => "LIMIT_EXCEEDED",
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::Storage(_) => "STORAGE_ERROR",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Shorthand for [`CoreError::NotFound`].
    pub fn not_found(entity: &'static str) -> Self {
        CoreError::NotFound { entity }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refresh_token_failures_have_distinct_codes() {
        let codes = [
            CoreError::InvalidToken.code(),
            CoreError::ExpiredToken.code(),
            CoreError::RevokedToken.code(),
        ];
        assert_ne!(codes[0], codes[1]);
        assert_ne!(codes[1], codes[2]);
        assert_ne!(codes[0], codes[2]);
    }

    #[test]
    fn not_found_message_names_entity() {
        let err = CoreError::not_found("SystemApiKey");
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(err.to_string(), "Entity not found: SystemApiKey");
    }
}
