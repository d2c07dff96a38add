//! Scope catalog for system API keys.
//!
//! Scopes are flat capability tags; checks are plain set membership.

use std::collections::BTreeSet;

use crate::error::{CoreError, CoreResult};

/// A set of scope tags attached to an API key.
pub type ScopeSet = BTreeSet<String>;

pub const CHAT: &str = "chat";
pub const EMBEDDING: &str = "embedding";
pub const IMAGE: &str = "image";
pub const AUDIO: &str = "audio";
pub const VIDEO: &str = "video";
pub const MODERATION: &str = "moderation";

/// Every scope a system key may carry.
pub const KNOWN_SCOPES: &[&str] = &[CHAT, EMBEDDING, IMAGE, AUDIO, VIDEO, MODERATION];

/// Scopes applied when a key is created without an explicit list.
pub const DEFAULT_SCOPES: &[&str] = &[CHAT, EMBEDDING, IMAGE];

/// Whether `scope` is part of [`KNOWN_SCOPES`].
pub fn is_known(scope: &str) -> bool {
    KNOWN_SCOPES.contains(&scope)
}

/// The default scope set as an owned [`ScopeSet`].
pub fn default_scopes() -> ScopeSet {
    DEFAULT_SCOPES.iter().map(|s| s.to_string()).collect()
}

/// Validate requested scopes against the catalog.
///
/// An empty request yields [`default_scopes`]. Duplicates collapse. The first
/// unknown scope fails the whole request.
pub fn resolve(requested: &[String]) -> CoreResult<ScopeSet> {
    if requested.is_empty() {
        return Ok(default_scopes());
    }

    let mut set = ScopeSet::new();
    for scope in requested {
        let scope = scope.trim();
        if !is_known(scope) {
            return Err(CoreError::InvalidApiKeyScope(scope.to_string()));
        }
        set.insert(scope.to_string());
    }
    Ok(set)
}
