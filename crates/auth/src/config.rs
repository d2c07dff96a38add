//! Environment-driven configuration for the credential services.

use std::time::Duration;

use crate::jwt::JwtConfig;
use crate::oauth::OAuth2Settings;
use crate::oauth::state::DEFAULT_STATE_TTL_SECS;
use crate::system_keys::DEFAULT_MAX_KEYS_PER_USER;

/// Default access token expiry in minutes.
const DEFAULT_ACCESS_EXPIRY_MINS: i64 = 15;
/// Default refresh token expiry in days.
const DEFAULT_REFRESH_EXPIRY_DAYS: i64 = 7;
/// Upper bounds keeping computed expiry timestamps in range.
const MAX_ACCESS_EXPIRY_MINS: i64 = 60 * 24 * 365;
const MAX_REFRESH_EXPIRY_DAYS: i64 = 3650;
const MAX_STATE_TTL_SECS: i64 = 60 * 60 * 24;
/// Default timeout for best-effort usage writes.
const DEFAULT_USAGE_UPDATE_TIMEOUT_MS: u64 = 2000;

/// Providers checked for `OAUTH_<NAME>_*` variables.
const KNOWN_PROVIDERS: &[&str] = &["github", "google"];

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} is invalid: {reason}")]
    Invalid { var: String, reason: String },
}

/// Everything needed to assemble the credential services.
#[derive(Clone)]
pub struct AuthConfig {
    pub jwt: JwtConfig,
    /// Base64-encoded 32-byte AES key.
    pub encryption_key: String,
    pub oauth_state_ttl_secs: i64,
    pub max_system_keys_per_user: i64,
    pub usage_update_timeout: Duration,
    pub providers: Vec<OAuth2Settings>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt", &self.jwt)
            .field("encryption_key", &"<redacted>")
            .field("oauth_state_ttl_secs", &self.oauth_state_ttl_secs)
            .field("max_system_keys_per_user", &self.max_system_keys_per_user)
            .field("usage_update_timeout", &self.usage_update_timeout)
            .field("providers", &self.providers)
            .finish()
    }
}

impl AuthConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                          | Required | Default |
    /// |----------------------------------|----------|---------|
    /// | `JWT_SECRET`                     | **yes**  | --      |
    /// | `JWT_ACCESS_EXPIRY_MINS`         | no       | `15`    |
    /// | `JWT_REFRESH_EXPIRY_DAYS`        | no       | `7`     |
    /// | `CREDENTIAL_ENCRYPTION_KEY`      | **yes**  | --      |
    /// | `OAUTH_STATE_TTL_SECS`           | no       | `600`   |
    /// | `MAX_SYSTEM_KEYS_PER_USER`       | no       | `5`     |
    /// | `USAGE_UPDATE_TIMEOUT_MS`        | no       | `2000`  |
    /// | `OAUTH_<PROVIDER>_CLIENT_ID`     | no       | --      |
    /// | `OAUTH_<PROVIDER>_CLIENT_SECRET` | no       | --      |
    /// | `OAUTH_<PROVIDER>_REDIRECT_URI`  | no       | --      |
    ///
    /// Lifetimes and the usage timeout must be positive. Lifetimes are capped
    /// at one year (access), ten years (refresh) and one day (state).
    /// A provider is enabled when all three of its `OAUTH_*` variables are set.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let secret = required(&lookup, "JWT_SECRET")?;
        let encryption_key = required(&lookup, "CREDENTIAL_ENCRYPTION_KEY")?;

        let jwt = JwtConfig {
            secret,
            access_token_expiry_mins: bounded(
                &lookup,
                "JWT_ACCESS_EXPIRY_MINS",
                DEFAULT_ACCESS_EXPIRY_MINS,
                MAX_ACCESS_EXPIRY_MINS,
            )?,
            refresh_token_expiry_days: bounded(
                &lookup,
                "JWT_REFRESH_EXPIRY_DAYS",
                DEFAULT_REFRESH_EXPIRY_DAYS,
                MAX_REFRESH_EXPIRY_DAYS,
            )?,
        };

        let usage_ms: u64 = positive(
            &lookup,
            "USAGE_UPDATE_TIMEOUT_MS",
            DEFAULT_USAGE_UPDATE_TIMEOUT_MS,
        )?;

        let mut providers = Vec::new();
        for name in KNOWN_PROVIDERS {
            let prefix = format!("OAUTH_{}", name.to_uppercase());
            let var = |suffix: &str| {
                lookup(format!("{prefix}_{suffix}").as_str()).filter(|v| !v.is_empty())
            };

            match (var("CLIENT_ID"), var("CLIENT_SECRET"), var("REDIRECT_URI")) {
                (Some(id), Some(secret), Some(redirect)) => {
                    if let Some(settings) = OAuth2Settings::preset(name, id, secret, redirect) {
                        providers.push(settings);
                    }
                }
                (None, None, None) => {}
                _ => {
                    return Err(ConfigError::Invalid {
                        var: format!("{prefix}_*"),
                        reason: "client id, client secret and redirect URI must be set together"
                            .into(),
                    })
                }
            }
        }

        Ok(Self {
            jwt,
            encryption_key,
            oauth_state_ttl_secs: bounded(
                &lookup,
                "OAUTH_STATE_TTL_SECS",
                DEFAULT_STATE_TTL_SECS,
                MAX_STATE_TTL_SECS,
            )?,
            max_system_keys_per_user: parsed(
                &lookup,
                "MAX_SYSTEM_KEYS_PER_USER",
                DEFAULT_MAX_KEYS_PER_USER,
            )?,
            usage_update_timeout: Duration::from_millis(usage_ms),
            providers,
        })
    }
}

fn required<F>(lookup: &F, var: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(var)
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::Missing(var))
}

fn parsed<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(var) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var: var.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// [`parsed`], rejecting zero and negative values.
fn positive<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + PartialOrd + Default,
    T::Err: std::fmt::Display,
{
    let value = parsed(lookup, var, default)?;
    if value <= T::default() {
        return Err(ConfigError::Invalid {
            var: var.to_string(),
            reason: "must be positive".into(),
        });
    }
    Ok(value)
}

fn bounded<F>(lookup: &F, var: &'static str, default: i64, max: i64) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = positive(lookup, var, default)?;
    if value > max {
        return Err(ConfigError::Invalid {
            var: var.to_string(),
            reason: format!("must be at most {max}"),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AuthConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AuthConfig::from_lookup(|name| map.get(name).cloned())
    }

    const BASE: &[(&str, &str)] = &[
        ("JWT_SECRET", "test-secret-that-is-long-enough-for-hmac"),
        ("CREDENTIAL_ENCRYPTION_KEY", "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA="),
    ];

    #[test]
    fn defaults_apply() {
        let config = load(BASE).unwrap();
        assert_eq!(config.jwt.access_token_expiry_mins, 15);
        assert_eq!(config.jwt.refresh_token_expiry_days, 7);
        assert_eq!(config.oauth_state_ttl_secs, 600);
        assert_eq!(config.max_system_keys_per_user, 5);
        assert_eq!(config.usage_update_timeout, Duration::from_millis(2000));
        assert!(config.providers.is_empty());
    }

    #[test]
    fn missing_secret_is_reported() {
        assert_matches!(
            load(&[("CREDENTIAL_ENCRYPTION_KEY", "x")]),
            Err(ConfigError::Missing("JWT_SECRET"))
        );
    }

    #[test]
    fn unparsable_number_is_reported() {
        let mut vars = BASE.to_vec();
        vars.push(("MAX_SYSTEM_KEYS_PER_USER", "many"));
        assert_matches!(
            load(&vars),
            Err(ConfigError::Invalid { var, .. }) if var == "MAX_SYSTEM_KEYS_PER_USER"
        );
    }

    #[test]
    fn non_positive_lifetimes_are_rejected() {
        for (var, value) in [
            ("JWT_ACCESS_EXPIRY_MINS", "0"),
            ("JWT_REFRESH_EXPIRY_DAYS", "-7"),
            ("OAUTH_STATE_TTL_SECS", "0"),
            ("USAGE_UPDATE_TIMEOUT_MS", "0"),
        ] {
            let mut vars = BASE.to_vec();
            vars.push((var, value));
            assert_matches!(
                load(&vars),
                Err(ConfigError::Invalid { var: v, reason }) if v == var && reason == "must be positive"
            );
        }
    }

    #[test]
    fn oversized_lifetimes_are_rejected() {
        for var in ["JWT_ACCESS_EXPIRY_MINS", "JWT_REFRESH_EXPIRY_DAYS", "OAUTH_STATE_TTL_SECS"] {
            let mut vars = BASE.to_vec();
            vars.push((var, "9223372036854775807"));
            assert_matches!(load(&vars), Err(ConfigError::Invalid { var: v, .. }) if v == var);
        }
    }

    #[test]
    fn complete_provider_is_enabled() {
        let mut vars = BASE.to_vec();
        vars.extend([
            ("OAUTH_GITHUB_CLIENT_ID", "id"),
            ("OAUTH_GITHUB_CLIENT_SECRET", "secret"),
            ("OAUTH_GITHUB_REDIRECT_URI", "http://localhost/cb"),
        ]);
        let config = load(&vars).unwrap();
        assert_eq!(config.providers.len(), 1);
        assert_eq!(config.providers[0].name, "github");
    }

    #[test]
    fn partial_provider_is_an_error() {
        let mut vars = BASE.to_vec();
        vars.push(("OAUTH_GOOGLE_CLIENT_ID", "id"));
        assert_matches!(load(&vars), Err(ConfigError::Invalid { .. }));
    }

    #[test]
    fn debug_hides_secrets() {
        let dbg = format!("{:?}", load(BASE).unwrap());
        assert!(!dbg.contains("test-secret"));
        assert!(!dbg.contains("AAAAAAAA"));
    }
}
