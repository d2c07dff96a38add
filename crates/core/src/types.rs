/// Row id of users, refresh tokens and API keys (`BIGSERIAL`). Also the
/// `sub` claim of access tokens.
pub type DbId = i64;

/// Creation, expiry and last-used instants, always UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
