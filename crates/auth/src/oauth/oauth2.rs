//! Authorization-code OAuth 2.0 provider over HTTP.
//!
//! GitHub and Google presets differ only in endpoints, requested scopes, and
//! how the profile document is mapped onto [`ProviderUserInfo`].

use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::Url;
use serde::Deserialize;
use serde_json::Value;

use super::provider::{OAuthProvider, ProviderError, ProviderToken, ProviderUserInfo};

/// User agent sent to provider APIs (GitHub rejects requests without one).
const CLIENT_USER_AGENT: &str = concat!("idforge/", env!("CARGO_PKG_VERSION"));

/// Shape of the provider's profile document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileFormat {
    /// `GET /user`: numeric `id`, `login`, `name`, `email`, `avatar_url`.
    GitHub,
    /// OpenID Connect userinfo: `sub`, `name`, `email`, `picture`.
    OpenIdConnect,
}

impl ProfileFormat {
    /// Map a profile document onto [`ProviderUserInfo`].
    ///
    /// `fallback_email` is used when the document carries no email, as GitHub
    /// does for users whose address is private.
    pub fn parse(
        self,
        doc: &Value,
        fallback_email: Option<String>,
    ) -> Result<ProviderUserInfo, ProviderError> {
        let text = |field: &str| text_field(doc, field);

        let (external_id, name, avatar_url) = match self {
            ProfileFormat::GitHub => {
                let id = match doc.get("id") {
                    Some(Value::Number(n)) => n.to_string(),
                    Some(Value::String(s)) if !s.is_empty() => s.clone(),
                    _ => return Err(ProviderError::Payload("profile has no id".into())),
                };
                let name = text("name").or_else(|| text("login"));
                (id, name, text("avatar_url"))
            }
            ProfileFormat::OpenIdConnect => {
                let sub = text("sub")
                    .ok_or_else(|| ProviderError::Payload("profile has no subject".into()))?;
                (sub, text("name"), text("picture"))
            }
        };

        let email = text("email")
            .or(fallback_email)
            .ok_or_else(|| ProviderError::Payload("profile has no email".into()))?;
        let name = name.unwrap_or_else(|| email.clone());

        Ok(ProviderUserInfo {
            external_id,
            email,
            name,
            avatar_url,
        })
    }
}

fn text_field(doc: &Value, field: &str) -> Option<String> {
    doc.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// One entry of GitHub's `GET /user/emails`.
#[derive(Deserialize)]
struct EmailEntry {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
}

/// The primary, verified address of an email list.
fn primary_verified_email(entries: Vec<EmailEntry>) -> Option<String> {
    entries
        .into_iter()
        .find(|e| e.primary && e.verified)
        .map(|e| e.email)
}

/// Endpoints and client credentials of one provider.
#[derive(Clone)]
pub struct OAuth2Settings {
    pub name: String,
    pub auth_url: String,
    pub token_url: String,
    pub userinfo_url: String,
    /// Address list queried when the profile hides the email (GitHub).
    pub emails_url: Option<String>,
    pub scopes: Vec<String>,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
    pub profile: ProfileFormat,
}

impl std::fmt::Debug for OAuth2Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Settings")
            .field("name", &self.name)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .field("userinfo_url", &self.userinfo_url)
            .field("emails_url", &self.emails_url)
            .field("scopes", &self.scopes)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

impl OAuth2Settings {
    pub fn github(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            name: "github".into(),
            auth_url: "https://github.com/login/oauth/authorize".into(),
            token_url: "https://github.com/login/oauth/access_token".into(),
            userinfo_url: "https://api.github.com/user".into(),
            emails_url: Some("https://api.github.com/user/emails".into()),
            scopes: vec!["read:user".into(), "user:email".into()],
            client_id,
            client_secret,
            redirect_uri,
            profile: ProfileFormat::GitHub,
        }
    }

    pub fn google(client_id: String, client_secret: String, redirect_uri: String) -> Self {
        Self {
            name: "google".into(),
            auth_url: "https://accounts.google.com/o/oauth2/v2/auth".into(),
            token_url: "https://oauth2.googleapis.com/token".into(),
            userinfo_url: "https://openidconnect.googleapis.com/v1/userinfo".into(),
            emails_url: None,
            scopes: vec!["openid".into(), "email".into(), "profile".into()],
            client_id,
            client_secret,
            redirect_uri,
            profile: ProfileFormat::OpenIdConnect,
        }
    }

    /// Preset for a known provider name, or `None`.
    pub fn preset(
        name: &str,
        client_id: String,
        client_secret: String,
        redirect_uri: String,
    ) -> Option<Self> {
        match name {
            "github" => Some(Self::github(client_id, client_secret, redirect_uri)),
            "google" => Some(Self::google(client_id, client_secret, redirect_uri)),
            _ => None,
        }
    }
}

/// Token endpoint response. GitHub reports failures as `200` with `error`.
#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// [`OAuthProvider`] backed by standard OAuth 2.0 HTTP endpoints.
#[derive(Debug, Clone)]
pub struct OAuth2Provider {
    settings: OAuth2Settings,
    authorize: Url,
    client: reqwest::Client,
}

impl OAuth2Provider {
    pub fn new(settings: OAuth2Settings) -> Result<Self, ProviderError> {
        Self::with_client(settings, reqwest::Client::new())
    }

    /// Build with a caller-supplied HTTP client (timeouts, proxies).
    pub fn with_client(
        settings: OAuth2Settings,
        client: reqwest::Client,
    ) -> Result<Self, ProviderError> {
        let authorize = Url::parse(&settings.auth_url)
            .map_err(|e| ProviderError::Config(format!("{}: auth_url: {e}", settings.name)))?;
        Ok(Self {
            settings,
            authorize,
            client,
        })
    }
}

#[async_trait]
impl OAuthProvider for OAuth2Provider {
    fn name(&self) -> &str {
        &self.settings.name
    }

    fn auth_url(&self, state: &str) -> String {
        let mut url = self.authorize.clone();
        url.query_pairs_mut()
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &self.settings.scopes.join(" "))
            .append_pair("state", state);
        url.into()
    }

    async fn exchange(&self, code: &str) -> Result<ProviderToken, ProviderError> {
        tracing::debug!(provider = %self.settings.name, "Exchanging authorization code");

        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.settings.redirect_uri.as_str()),
            ("client_id", self.settings.client_id.as_str()),
            ("client_secret", self.settings.client_secret.as_str()),
        ];

        let response = self
            .client
            .post(&self.settings.token_url)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .form(&form[..])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        let body: TokenResponse = response.json().await?;
        match (body.access_token, body.error) {
            (_, Some(error)) => Err(ProviderError::Rejected(error)),
            (Some(access_token), None) if !access_token.is_empty() => Ok(ProviderToken {
                access_token,
                token_type: body.token_type,
            }),
            _ => Err(ProviderError::Payload("token response has no access_token".into())),
        }
    }

    async fn user_info(&self, token: &ProviderToken) -> Result<ProviderUserInfo, ProviderError> {
        let doc: Value = self.get_json(&self.settings.userinfo_url, token).await?;

        let fallback_email = match &self.settings.emails_url {
            Some(url) if text_field(&doc, "email").is_none() => {
                tracing::debug!(
                    provider = %self.settings.name,
                    "Profile email hidden, querying address list",
                );
                let entries: Vec<EmailEntry> = self.get_json(url, token).await?;
                primary_verified_email(entries)
            }
            _ => None,
        };

        self.settings.profile.parse(&doc, fallback_email)
    }
}

impl OAuth2Provider {
    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        token: &ProviderToken,
    ) -> Result<T, ProviderError> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&token.access_token)
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status().as_u16()));
        }

        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn github() -> OAuth2Provider {
        OAuth2Provider::new(OAuth2Settings::github(
            "client-123".into(),
            "shh".into(),
            "http://localhost:3000/auth/callback/github".into(),
        ))
        .unwrap()
    }

    #[test]
    fn auth_url_carries_client_redirect_scope_and_state() {
        let url = Url::parse(&github().auth_url("st@te")).unwrap();
        assert_eq!(url.host_str(), Some("github.com"));

        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        let get = |k: &str| pairs.iter().find(|(key, _)| key == k).map(|(_, v)| v.as_str());
        assert_eq!(get("client_id"), Some("client-123"));
        assert_eq!(
            get("redirect_uri"),
            Some("http://localhost:3000/auth/callback/github")
        );
        assert_eq!(get("scope"), Some("read:user user:email"));
        assert_eq!(get("state"), Some("st@te"));
        assert_eq!(get("response_type"), Some("code"));
        assert!(get("client_secret").is_none());
    }

    #[test]
    fn invalid_auth_url_is_a_config_error() {
        let mut settings = OAuth2Settings::google("id".into(), "secret".into(), "cb".into());
        settings.auth_url = "not a url".into();
        assert_matches!(OAuth2Provider::new(settings), Err(ProviderError::Config(_)));
    }

    #[test]
    fn settings_debug_hides_client_secret() {
        let settings = OAuth2Settings::github("id".into(), "very-secret".into(), "cb".into());
        assert!(!format!("{settings:?}").contains("very-secret"));
    }

    #[test]
    fn unknown_preset_is_none() {
        assert!(OAuth2Settings::preset("gitlab", "a".into(), "b".into(), "c".into()).is_none());
        assert!(OAuth2Settings::preset("google", "a".into(), "b".into(), "c".into()).is_some());
    }

    #[test]
    fn github_profile_falls_back_to_login() {
        let info = ProfileFormat::GitHub
            .parse(
                &json!({
                    "id": 583231,
                    "login": "octocat",
                    "name": null,
                    "email": "octocat@github.com",
                    "avatar_url": "https://avatars.githubusercontent.com/u/583231"
                }),
                Some("ignored@example.com".into()),
            )
            .unwrap();
        assert_eq!(info.external_id, "583231");
        assert_eq!(info.name, "octocat");
        assert_eq!(info.email, "octocat@github.com");
        assert!(info.avatar_url.is_some());
    }

    #[test]
    fn oidc_profile_maps_sub_and_picture() {
        let info = ProfileFormat::OpenIdConnect
            .parse(
                &json!({
                    "sub": "110169484474386276334",
                    "name": "Ada Lovelace",
                    "email": "ada@example.com",
                    "picture": "https://lh3.googleusercontent.com/a/photo.jpg"
                }),
                None,
            )
            .unwrap();
        assert_eq!(info.external_id, "110169484474386276334");
        assert_eq!(info.name, "Ada Lovelace");
        assert_eq!(
            info.avatar_url.as_deref(),
            Some("https://lh3.googleusercontent.com/a/photo.jpg")
        );
    }

    #[test]
    fn profile_without_email_is_rejected() {
        assert_matches!(
            ProfileFormat::GitHub.parse(&json!({ "id": 1, "login": "x", "email": null }), None),
            Err(ProviderError::Payload(_))
        );
        assert_matches!(
            ProfileFormat::OpenIdConnect.parse(&json!({ "email": "a@b.c" }), None),
            Err(ProviderError::Payload(_))
        );
    }

    fn github_at(server: &mockito::Server) -> OAuth2Provider {
        let mut settings = OAuth2Settings::github("id".into(), "secret".into(), "cb".into());
        settings.token_url = format!("{}/login/oauth/access_token", server.url());
        settings.userinfo_url = format!("{}/user", server.url());
        settings.emails_url = Some(format!("{}/user/emails", server.url()));
        OAuth2Provider::new(settings).unwrap()
    }

    fn bearer(token: &str) -> ProviderToken {
        ProviderToken {
            access_token: token.into(),
            token_type: Some("bearer".into()),
        }
    }

    #[tokio::test]
    async fn hidden_github_email_uses_primary_verified_address() {
        let mut server = mockito::Server::new_async().await;
        let _profile = server
            .mock("GET", "/user")
            .match_header("authorization", "Bearer gho_abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 42, "login": "quiet", "name": null, "email": null}"#)
            .create_async()
            .await;
        let emails = server
            .mock("GET", "/user/emails")
            .match_header("authorization", "Bearer gho_abc")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"[
                    {"email": "old@example.com", "primary": false, "verified": true},
                    {"email": "unverified@example.com", "primary": true, "verified": false},
                    {"email": "quiet@example.com", "primary": true, "verified": true}
                ]"#,
            )
            .create_async()
            .await;

        let info = github_at(&server).user_info(&bearer("gho_abc")).await.unwrap();

        emails.assert_async().await;
        assert_eq!(info.external_id, "42");
        assert_eq!(info.email, "quiet@example.com");
        assert_eq!(info.name, "quiet");
    }

    #[tokio::test]
    async fn public_github_email_skips_address_list() {
        let mut server = mockito::Server::new_async().await;
        let _profile = server
            .mock("GET", "/user")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 7, "login": "loud", "email": "loud@example.com"}"#)
            .create_async()
            .await;
        let emails = server.mock("GET", "/user/emails").expect(0).create_async().await;

        let info = github_at(&server).user_info(&bearer("t")).await.unwrap();

        emails.assert_async().await;
        assert_eq!(info.email, "loud@example.com");
    }

    #[tokio::test]
    async fn no_verified_primary_address_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _profile = server
            .mock("GET", "/user")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 9, "login": "ghost", "email": null}"#)
            .create_async()
            .await;
        let _emails = server
            .mock("GET", "/user/emails")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"[{"email": "ghost@example.com", "primary": true, "verified": false}]"#)
            .create_async()
            .await;

        assert_matches!(
            github_at(&server).user_info(&bearer("t")).await,
            Err(ProviderError::Payload(_))
        );
    }

    #[tokio::test]
    async fn github_error_body_is_rejected() {
        let mut server = mockito::Server::new_async().await;
        let _token = server
            .mock("POST", "/login/oauth/access_token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error": "bad_verification_code"}"#)
            .create_async()
            .await;

        assert_matches!(
            github_at(&server).exchange("stale").await,
            Err(ProviderError::Rejected(e)) if e == "bad_verification_code"
        );
    }
}
