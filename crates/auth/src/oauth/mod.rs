//! Federated login over OAuth 2.0.
//!
//! - [`provider`] -- the [`OAuthProvider`] seam and [`ProviderRegistry`].
//! - [`oauth2`] -- HTTP implementation with GitHub and Google presets.
//! - [`state`] -- single-use CSRF state values.
//! - [`flow`] -- the login orchestration.

pub mod flow;
pub mod oauth2;
pub mod provider;
pub mod state;

pub use flow::{CompleteLogin, LoginOutcome, LoginRedirect, OAuthLoginService};
pub use oauth2::{OAuth2Provider, OAuth2Settings, ProfileFormat};
pub use provider::{OAuthProvider, ProviderError, ProviderRegistry, ProviderToken, ProviderUserInfo};
pub use state::StateManager;
