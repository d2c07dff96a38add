//! API key material generation, display prefixes, and format checks.
//!
//! This module lives in `core` (zero internal deps) so it can be used by both
//! the repository layer and the key managers.

use std::sync::LazyLock;

use rand::Rng;
use regex::Regex;

use crate::crypto::SecretCodec;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Recognizable prefix of every system-issued key.
pub const SYSTEM_KEY_PREFIX: &str = "sk-";

/// Number of random alphanumeric characters after [`SYSTEM_KEY_PREFIX`].
pub const KEY_BODY_LENGTH: usize = 48;

/// Number of leading characters of a system key kept for display.
pub const SYSTEM_KEY_DISPLAY_PREFIX_LENGTH: usize = 10;

/// Number of leading characters of a user provider key kept for display.
pub const USER_KEY_DISPLAY_PREFIX_LENGTH: usize = 7;

/// Default requests-per-minute limit for new system keys.
pub const DEFAULT_RATE_LIMIT_RPM: i32 = 60;

/// Default tokens-per-minute limit for new system keys.
pub const DEFAULT_RATE_LIMIT_TPM: i32 = 100_000;

static SYSTEM_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        "^{}[A-Za-z0-9]{{{}}}$",
        regex::escape(SYSTEM_KEY_PREFIX),
        KEY_BODY_LENGTH
    ))
    .expect("system key pattern is a valid regex")
});

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// The result of generating a new system API key.
pub struct GeneratedApiKey {
    /// The plaintext key (shown to the caller exactly once, never stored).
    pub plaintext: String,
    /// The first [`SYSTEM_KEY_DISPLAY_PREFIX_LENGTH`] characters, for display.
    pub prefix: String,
    /// One-way digest of the plaintext (stored for lookup).
    pub hash: String,
}

impl std::fmt::Debug for GeneratedApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeneratedApiKey")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Generate a new random system API key of the form `sk-<48 alphanumerics>`.
pub fn generate_api_key(codec: &dyn SecretCodec) -> GeneratedApiKey {
    let body: String = rand::rng()
        .sample_iter(&rand::distr::Alphanumeric)
        .take(KEY_BODY_LENGTH)
        .map(char::from)
        .collect();

    let plaintext = format!("{SYSTEM_KEY_PREFIX}{body}");
    let prefix = display_prefix(&plaintext, SYSTEM_KEY_DISPLAY_PREFIX_LENGTH);
    let hash = codec.hash(&plaintext);

    GeneratedApiKey {
        plaintext,
        prefix,
        hash,
    }
}

// ---------------------------------------------------------------------------
// Inspection
// ---------------------------------------------------------------------------

/// Whether `raw` has the exact shape of a system-issued key.
///
/// This is a cheap syntactic check run before any lookup.
pub fn is_well_formed(raw: &str) -> bool {
    SYSTEM_KEY_RE.is_match(raw)
}

/// The first `len` characters of `raw` (character-safe).
pub fn display_prefix(raw: &str, len: usize) -> String {
    raw.chars().take(len).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AesGcmCodec;

    fn codec() -> AesGcmCodec {
        AesGcmCodec::new(&[1u8; 32]).unwrap()
    }

    // -- Key generation ----------------------------------------------------

    #[test]
    fn generated_key_has_prefix_and_length() {
        let key = generate_api_key(&codec());
        assert!(key.plaintext.starts_with(SYSTEM_KEY_PREFIX));
        assert_eq!(key.plaintext.len(), SYSTEM_KEY_PREFIX.len() + KEY_BODY_LENGTH);
    }

    #[test]
    fn generated_key_prefix_matches_start() {
        let key = generate_api_key(&codec());
        assert_eq!(
            &key.plaintext[..SYSTEM_KEY_DISPLAY_PREFIX_LENGTH],
            key.prefix
        );
    }

    #[test]
    fn generated_key_hash_matches_codec() {
        let codec = codec();
        let key = generate_api_key(&codec);
        assert_eq!(key.hash, codec.hash(&key.plaintext));
        assert_eq!(key.hash.len(), 64);
    }

    #[test]
    fn different_keys_produce_different_hashes() {
        let codec = codec();
        let a = generate_api_key(&codec);
        let b = generate_api_key(&codec);
        assert_ne!(a.plaintext, b.plaintext);
        assert_ne!(a.hash, b.hash);
    }

    #[test]
    fn debug_output_hides_plaintext() {
        let key = generate_api_key(&codec());
        let dbg = format!("{key:?}");
        assert!(!dbg.contains(&key.plaintext));
        assert!(!dbg.contains(&key.hash));
    }

    // -- Format checks -----------------------------------------------------

    #[test]
    fn generated_key_is_well_formed() {
        assert!(is_well_formed(&generate_api_key(&codec()).plaintext));
    }

    #[test]
    fn malformed_keys_are_rejected() {
        assert!(!is_well_formed(""));
        assert!(!is_well_formed("sk-short"));
        assert!(!is_well_formed(&format!("pk-{}", "a".repeat(KEY_BODY_LENGTH))));
        assert!(!is_well_formed(&format!("sk-{}", "a".repeat(KEY_BODY_LENGTH + 1))));
        assert!(!is_well_formed(&format!("sk-{}!", "a".repeat(KEY_BODY_LENGTH - 1))));
    }

    // -- Prefix extraction -------------------------------------------------

    #[test]
    fn display_prefix_handles_short_and_multibyte_input() {
        assert_eq!(display_prefix("abcdefghij", 7), "abcdefg");
        assert_eq!(display_prefix("abc", 7), "abc");
        assert_eq!(display_prefix("ключ-секрет", 4), "ключ");
    }
}
