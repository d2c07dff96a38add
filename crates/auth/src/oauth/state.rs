//! OAuth state management for CSRF protection.
//!
//! A state value binds one authorization redirect to the provider it was
//! issued for. Values are random, expire after a TTL, and are single-use.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use idforge_core::error::CoreResult;
use idforge_db::repositories::OAuthStateRepository;
use rand::Rng;

/// Bytes of randomness per state value (256 bits).
const STATE_BYTES: usize = 32;

/// Default state lifetime in seconds.
pub const DEFAULT_STATE_TTL_SECS: i64 = 600;

/// Issues and consumes state values over a pluggable store.
#[derive(Clone)]
pub struct StateManager {
    store: Arc<dyn OAuthStateRepository>,
    ttl: Duration,
}

impl StateManager {
    pub fn new(store: Arc<dyn OAuthStateRepository>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Generate a fresh state value bound to `provider` and persist it.
    pub async fn issue(&self, provider: &str) -> CoreResult<String> {
        let state = random_state();
        self.store
            .set(&state, provider, Utc::now() + self.ttl)
            .await?;
        Ok(state)
    }

    /// Remove `state` and return the provider it was issued for.
    ///
    /// The entry is deleted whether or not it is still valid; `None` means
    /// unknown, expired, or already consumed.
    pub async fn consume(&self, state: &str) -> CoreResult<Option<String>> {
        Ok(self.store.take(state).await?)
    }

    /// Drop expired entries. Returns the number removed.
    pub async fn purge_expired(&self) -> CoreResult<u64> {
        Ok(self.store.purge_expired(Utc::now()).await?)
    }
}

fn random_state() -> String {
    let mut bytes = [0u8; STATE_BYTES];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
