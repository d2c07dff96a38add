//! Domain primitives shared by every idforge crate.
//!
//! - [`error`] -- the credential error taxonomy and its stable codes.
//! - [`hashing`] -- SHA-256 digests used for lookup-only secrets.
//! - [`crypto`] -- the secret codec (hash for lookup, AES-256-GCM for retrieval).
//! - [`api_keys`] -- system API key material generation and format checks.
//! - [`scopes`] -- the known scope catalog and scope-set validation.
//! - [`ownership`] -- the owner check applied before every mutation.

pub mod api_keys;
pub mod crypto;
pub mod error;
pub mod hashing;
pub mod ownership;
pub mod scopes;
pub mod types;
