//! Lookup digests for bearer secrets.
//!
//! Refresh tokens and system API keys are stored only as digests; a presented
//! secret is digested again and matched by equality in storage.

use sha2::{Digest, Sha256};

/// Lowercase hex SHA-256 of `secret`, 64 characters long.
pub fn secret_digest(secret: &str) -> String {
    format!("{:x}", Sha256::digest(secret.as_bytes()))
}
