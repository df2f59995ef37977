use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use crate::app::{Result, RythmError};
use crate::config::OAuthClientConfig;

pub(crate) const USER_AGENT: &str = concat!("rythm/", env!("CARGO_PKG_VERSION"));

/// Identity returned by a social login provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SocialProfile {
    pub provider: String,
    pub provider_id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub fname: Option<String>,
    pub lname: Option<String>,
}

/// The first leg of a social login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginStart {
    /// Where to send the browser.
    pub url: String,
    /// Key the callback will carry back.
    pub state: String,
    /// Kept server side until the callback.
    pub secret: Option<String>,
}

/// What came back on the callback, matched to its [`LoginStart`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    /// Authorization code (OAuth 2) or verifier (OAuth 1.0a).
    pub code: String,
    pub state: String,
    pub secret: Option<String>,
}

/// A social login provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Begin a login. `state` is a fresh random value the provider may use
    /// as the callback key.
    async fn start(&self, state: &str) -> Result<LoginStart>;

    /// Trade the callback grant for the caller's profile.
    async fn exchange(&self, grant: &Grant) -> Result<SocialProfile>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Github,
    Google,
    Linkedin,
    Twitter,
}

pub struct Endpoints {
    pub authorize: &'static str,
    pub token: &'static str,
    pub profile: &'static str,
    pub scope: &'static str,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Github,
        ProviderKind::Google,
        ProviderKind::Linkedin,
        ProviderKind::Twitter,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "github" => Some(ProviderKind::Github),
            "google" => Some(ProviderKind::Google),
            "linkedin" => Some(ProviderKind::Linkedin),
            "twitter" => Some(ProviderKind::Twitter),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProviderKind::Github => "github",
            ProviderKind::Google => "google",
            ProviderKind::Linkedin => "linkedin",
            ProviderKind::Twitter => "twitter",
        }
    }

    /// Twitter still signs requests with OAuth 1.0a.
    pub fn is_oauth1(&self) -> bool {
        matches!(self, ProviderKind::Twitter)
    }

    /// Callback URL: the configured one, else `{public_url}/auth/{name}/callback`.
    pub fn callback_url(&self, config: &OAuthClientConfig, public_url: &str) -> String {
        config.redirect_uri.clone().unwrap_or_else(|| {
            format!(
                "{}/auth/{}/callback",
                public_url.trim_end_matches('/'),
                self.name()
            )
        })
    }

    pub fn endpoints(&self) -> Endpoints {
        match self {
            ProviderKind::Github => Endpoints {
                authorize: "https://github.com/login/oauth/authorize",
                token: "https://github.com/login/oauth/access_token",
                profile: "https://api.github.com/user",
                scope: "read:user user:email",
            },
            ProviderKind::Google => Endpoints {
                authorize: "https://accounts.google.com/o/oauth2/v2/auth",
                token: "https://oauth2.googleapis.com/token",
                profile: "https://openidconnect.googleapis.com/v1/userinfo",
                scope: "openid email profile",
            },
            ProviderKind::Linkedin => Endpoints {
                authorize: "https://www.linkedin.com/oauth/v2/authorization",
                token: "https://www.linkedin.com/oauth/v2/accessToken",
                profile: "https://api.linkedin.com/v2/userinfo",
                scope: "openid profile email",
            },
            ProviderKind::Twitter => Endpoints {
                authorize: "https://api.twitter.com/oauth/authenticate",
                token: "https://api.twitter.com/oauth/access_token",
                profile: "https://api.twitter.com/1.1/account/verify_credentials.json",
                scope: "",
            },
        }
    }

    /// Map the provider's profile document onto a [`SocialProfile`].
    pub fn map_profile(&self, doc: &Value) -> Result<SocialProfile> {
        let text = |key: &str| {
            doc.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let id_key = match self {
            ProviderKind::Github => "id",
            ProviderKind::Google | ProviderKind::Linkedin => "sub",
            ProviderKind::Twitter => "id_str",
        };
        let provider_id = match doc.get(id_key) {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => {
                return Err(RythmError::Provider(format!(
                    "{} profile has no '{id_key}'",
                    self.name()
                )))
            }
        };

        let profile = match self {
            ProviderKind::Github => SocialProfile {
                provider: self.name().to_string(),
                provider_id,
                email: text("email").map(|e| e.to_lowercase()),
                username: text("login"),
                display_name: text("name"),
                fname: None,
                lname: None,
            },
            ProviderKind::Google | ProviderKind::Linkedin => SocialProfile {
                provider: self.name().to_string(),
                provider_id,
                email: text("email").map(|e| e.to_lowercase()),
                username: None,
                display_name: text("name"),
                fname: text("given_name"),
                lname: text("family_name"),
            },
            ProviderKind::Twitter => SocialProfile {
                provider: self.name().to_string(),
                provider_id,
                email: text("email").map(|e| e.to_lowercase()),
                username: text("screen_name"),
                display_name: text("name"),
                fname: None,
                lname: None,
            },
        };
        Ok(profile)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// reqwest-backed authorization-code client for one [`ProviderKind`].
pub struct OAuth2Provider {
    kind: ProviderKind,
    client_id: String,
    client_secret: String,
    redirect_uri: String,
    client: reqwest::Client,
}

impl OAuth2Provider {
    /// `public_url` is used to build the callback URL when the client
    /// config does not name one.
    pub fn new(kind: ProviderKind, config: &OAuthClientConfig, public_url: &str) -> Self {
        Self {
            kind,
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            redirect_uri: kind.callback_url(config, public_url),
            client: reqwest::Client::new(),
        }
    }

    /// Where to send the browser. `state` comes back on the callback.
    pub fn authorize_url(&self, state: &str) -> Result<String> {
        let endpoints = self.kind.endpoints();
        let url = Url::parse_with_params(
            endpoints.authorize,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("scope", endpoints.scope),
                ("state", state),
            ],
        )
        .map_err(|e| RythmError::Config(format!("Invalid authorize URL: {e}")))?;
        Ok(url.into())
    }

    async fn fetch_access_token(&self, code: &str) -> Result<String> {
        let endpoints = self.kind.endpoints();
        let form = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.as_str()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ];

        let resp = self
            .client
            .post(endpoints.token)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .form(&form)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            warn!(provider = self.kind.name(), %status, "Token exchange failed");
            return Err(RythmError::Provider(format!(
                "token exchange failed ({status}): {text}"
            )));
        }

        let data: TokenResponse = resp.json().await?;
        match (data.access_token, data.error) {
            (Some(token), None) => Ok(token),
            (_, error) => Err(RythmError::Provider(format!(
                "token exchange rejected: {}",
                data.error_description
                    .or(error)
                    .unwrap_or_else(|| "no access token".to_string())
            ))),
        }
    }
}

#[async_trait]
impl IdentityProvider for OAuth2Provider {
    fn name(&self) -> &str {
        self.kind.name()
    }

    async fn start(&self, state: &str) -> Result<LoginStart> {
        Ok(LoginStart {
            url: self.authorize_url(state)?,
            state: state.to_string(),
            secret: None,
        })
    }

    async fn exchange(&self, grant: &Grant) -> Result<SocialProfile> {
        let access_token = self.fetch_access_token(&grant.code).await?;

        let resp = self
            .client
            .get(self.kind.endpoints().profile)
            .bearer_auth(&access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(RythmError::Provider(format!(
                "profile request failed: {}",
                resp.status()
            )));
        }

        let doc: Value = resp.json().await?;
        let profile = self.kind.map_profile(&doc)?;
        debug!(provider = self.kind.name(), provider_id = %profile.provider_id, "Fetched profile");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn client_config() -> OAuthClientConfig {
        OAuthClientConfig {
            client_id: "client-123".into(),
            client_secret: "s3cret".into(),
            redirect_uri: None,
        }
    }

    #[test]
    fn test_parse_kind() {
        assert_eq!(ProviderKind::parse("GitHub"), Some(ProviderKind::Github));
        assert_eq!(ProviderKind::parse("linkedin"), Some(ProviderKind::Linkedin));
        assert_eq!(ProviderKind::parse("Twitter"), Some(ProviderKind::Twitter));
        assert_eq!(ProviderKind::parse("myspace"), None);
        assert!(ProviderKind::Twitter.is_oauth1());
        assert!(!ProviderKind::Github.is_oauth1());
    }

    #[test]
    fn test_authorize_url_carries_state_and_callback() {
        let provider = OAuth2Provider::new(
            ProviderKind::Google,
            &client_config(),
            "https://rythm.example/",
        );
        let url = Url::parse(&provider.authorize_url("st@te").unwrap()).unwrap();
        assert_eq!(url.host_str(), Some("accounts.google.com"));

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["state"], "st@te");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(
            pairs["redirect_uri"],
            "https://rythm.example/auth/google/callback"
        );
        assert!(!pairs.contains_key("client_secret"));
    }

    #[test]
    fn test_explicit_redirect_uri_wins() {
        let mut config = client_config();
        config.redirect_uri = Some("http://localhost:3000/cb".into());
        let provider = OAuth2Provider::new(ProviderKind::Github, &config, "http://ignored");
        let url = provider.authorize_url("s").unwrap();
        assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A3000%2Fcb"));
    }

    #[test]
    fn test_map_github_profile() {
        let doc = json!({
            "id": 583231,
            "login": "octocat",
            "name": "The Octocat",
            "email": "Octocat@GitHub.com"
        });
        let profile = ProviderKind::Github.map_profile(&doc).unwrap();
        assert_eq!(profile.provider, "github");
        assert_eq!(profile.provider_id, "583231");
        assert_eq!(profile.username.as_deref(), Some("octocat"));
        assert_eq!(profile.email.as_deref(), Some("octocat@github.com"));
    }

    #[test]
    fn test_map_openid_profile() {
        let doc = json!({
            "sub": "1100220033",
            "name": "Ada Lovelace",
            "given_name": "Ada",
            "family_name": "Lovelace",
            "email": ""
        });
        let profile = ProviderKind::Linkedin.map_profile(&doc).unwrap();
        assert_eq!(profile.provider_id, "1100220033");
        assert_eq!(profile.fname.as_deref(), Some("Ada"));
        assert_eq!(profile.lname.as_deref(), Some("Lovelace"));
        assert_eq!(profile.email, None);
        assert_eq!(profile.username, None);
    }

    #[tokio::test]
    async fn test_start_uses_state_as_callback_key() {
        let provider = OAuth2Provider::new(ProviderKind::Github, &client_config(), "http://x");
        let start = provider.start("abc").await.unwrap();
        assert_eq!(start.state, "abc");
        assert_eq!(start.secret, None);
        assert!(start.url.contains("state=abc"));
    }

    #[test]
    fn test_map_twitter_profile() {
        let doc = json!({
            "id": 12,
            "id_str": "12",
            "screen_name": "jack",
            "name": "jack",
            "email": "Jack@Twitter.com"
        });
        let profile = ProviderKind::Twitter.map_profile(&doc).unwrap();
        assert_eq!(profile.provider, "twitter");
        assert_eq!(profile.provider_id, "12");
        assert_eq!(profile.username.as_deref(), Some("jack"));
        assert_eq!(profile.email.as_deref(), Some("jack@twitter.com"));
        assert_eq!(profile.fname, None);
    }

    #[test]
    fn test_map_profile_without_id() {
        let err = ProviderKind::Google
            .map_profile(&json!({"email": "x@y.z"}))
            .unwrap_err();
        assert!(matches!(err, RythmError::Provider(_)));
        assert_eq!(err.status_code(), 502);
    }
}
