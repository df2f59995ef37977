//! OAuth 1.0a login (HMAC-SHA1), as Twitter speaks it.
//!
//! ```text
//! POST request_token → redirect to authenticate?oauth_token → callback
//!   (oauth_token, oauth_verifier) → POST access_token → GET verify_credentials
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use sha1::Sha1;
use tracing::{debug, warn};
use url::Url;

use crate::app::{Result, RythmError};
use crate::auth::oauth::{
    Grant, IdentityProvider, LoginStart, ProviderKind, SocialProfile, USER_AGENT,
};
use crate::auth::session::generate_token;
use crate::config::OAuthClientConfig;

const REQUEST_TOKEN_URL: &str = "https://api.twitter.com/oauth/request_token";

/// Everything except unreserved characters is escaped.
const UNRESERVED: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

fn escape(s: &str) -> String {
    utf8_percent_encode(s, UNRESERVED).to_string()
}

/// Credentials one request is signed with.
pub struct Signer<'a> {
    pub consumer_key: &'a str,
    pub consumer_secret: &'a str,
    /// Request or access token with its secret.
    pub token: Option<(&'a str, &'a str)>,
}

impl Signer<'_> {
    /// HMAC-SHA1 over the signature base string of `method url` with every
    /// protocol and request parameter in `params`.
    pub fn signature(&self, method: &str, url: &str, params: &[(&str, &str)]) -> Result<String> {
        let mut encoded: Vec<(String, String)> =
            params.iter().map(|(k, v)| (escape(k), escape(v))).collect();
        encoded.sort();
        let normalized = encoded
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");

        let base = format!(
            "{}&{}&{}",
            method.to_ascii_uppercase(),
            escape(url),
            escape(&normalized)
        );
        let key = format!(
            "{}&{}",
            escape(self.consumer_secret),
            escape(self.token.map(|(_, secret)| secret).unwrap_or(""))
        );

        let mut mac = Hmac::<Sha1>::new_from_slice(key.as_bytes())
            .map_err(|e| RythmError::Other(format!("Invalid signing key: {e}")))?;
        mac.update(base.as_bytes());
        Ok(STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// `Authorization` header for a request carrying `params` in its query
    /// or form body. `protocol` holds extra `oauth_*` fields such as the
    /// callback or verifier.
    pub fn authorization(
        &self,
        method: &str,
        url: &str,
        protocol: &[(&str, &str)],
        params: &[(&str, &str)],
        nonce: &str,
        timestamp: i64,
    ) -> Result<String> {
        let timestamp = timestamp.to_string();
        let mut oauth: Vec<(&str, &str)> = vec![
            ("oauth_consumer_key", self.consumer_key),
            ("oauth_nonce", nonce),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", timestamp.as_str()),
            ("oauth_version", "1.0"),
        ];
        if let Some((token, _)) = self.token {
            oauth.push(("oauth_token", token));
        }
        oauth.extend_from_slice(protocol);

        let mut signed = oauth.clone();
        signed.extend_from_slice(params);
        let signature = self.signature(method, url, &signed)?;

        oauth.sort();
        let fields = oauth
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", escape(k), escape(v)))
            .chain(std::iter::once(format!(
                "oauth_signature=\"{}\"",
                escape(&signature)
            )))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!("OAuth {fields}"))
    }
}

/// reqwest-backed OAuth 1.0a client.
pub struct OAuth1Provider {
    kind: ProviderKind,
    consumer_key: String,
    consumer_secret: String,
    callback_url: String,
    client: reqwest::Client,
}

impl OAuth1Provider {
    /// `client_id` and `client_secret` hold the consumer key and secret.
    pub fn new(kind: ProviderKind, config: &OAuthClientConfig, public_url: &str) -> Self {
        Self {
            kind,
            consumer_key: config.client_id.clone(),
            consumer_secret: config.client_secret.clone(),
            callback_url: kind.callback_url(config, public_url),
            client: reqwest::Client::new(),
        }
    }

    fn signer<'a>(&'a self, token: Option<(&'a str, &'a str)>) -> Signer<'a> {
        Signer {
            consumer_key: &self.consumer_key,
            consumer_secret: &self.consumer_secret,
            token,
        }
    }

    /// Signed POST whose reply is a form-encoded token set.
    async fn post_for_token(
        &self,
        url: &str,
        signer: &Signer<'_>,
        protocol: &[(&str, &str)],
    ) -> Result<HashMap<String, String>> {
        let header = signer.authorization(
            "POST",
            url,
            protocol,
            &[],
            &generate_token(),
            Utc::now().timestamp(),
        )?;

        let resp = self
            .client
            .post(url)
            .header(reqwest::header::AUTHORIZATION, header)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            warn!(provider = self.kind.name(), %status, url, "Token request failed");
            return Err(RythmError::Provider(format!(
                "token request failed ({status}): {text}"
            )));
        }

        let body = resp.text().await?;
        Ok(parse_token_reply(&body))
    }
}

fn parse_token_reply(body: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(body.as_bytes())
        .into_owned()
        .collect()
}

fn required(reply: &HashMap<String, String>, key: &str) -> Result<String> {
    reply
        .get(key)
        .filter(|v| !v.is_empty())
        .cloned()
        .ok_or_else(|| RythmError::Provider(format!("token reply has no '{key}'")))
}

#[async_trait]
impl IdentityProvider for OAuth1Provider {
    fn name(&self) -> &str {
        self.kind.name()
    }

    async fn start(&self, _state: &str) -> Result<LoginStart> {
        let reply = self
            .post_for_token(
                REQUEST_TOKEN_URL,
                &self.signer(None),
                &[("oauth_callback", self.callback_url.as_str())],
            )
            .await?;

        if reply.get("oauth_callback_confirmed").map(String::as_str) != Some("true") {
            return Err(RythmError::Provider(
                "callback was not confirmed".to_string(),
            ));
        }
        let token = required(&reply, "oauth_token")?;
        let secret = required(&reply, "oauth_token_secret")?;

        let url = Url::parse_with_params(
            self.kind.endpoints().authorize,
            &[("oauth_token", token.as_str())],
        )
        .map_err(|e| RythmError::Config(format!("Invalid authorize URL: {e}")))?;

        Ok(LoginStart {
            url: url.into(),
            state: token,
            secret: Some(secret),
        })
    }

    async fn exchange(&self, grant: &Grant) -> Result<SocialProfile> {
        let request_secret = grant
            .secret
            .as_deref()
            .ok_or_else(|| RythmError::Provider("request token secret is missing".to_string()))?;
        let endpoints = self.kind.endpoints();

        let reply = self
            .post_for_token(
                endpoints.token,
                &self.signer(Some((grant.state.as_str(), request_secret))),
                &[("oauth_verifier", grant.code.as_str())],
            )
            .await?;
        let token = required(&reply, "oauth_token")?;
        let token_secret = required(&reply, "oauth_token_secret")?;

        let query = [("include_email", "true"), ("skip_status", "true")];
        let header = self
            .signer(Some((token.as_str(), token_secret.as_str())))
            .authorization(
                "GET",
                endpoints.profile,
                &[],
                &query,
                &generate_token(),
                Utc::now().timestamp(),
            )?;

        let resp = self
            .client
            .get(endpoints.profile)
            .query(&query)
            .header(reqwest::header::AUTHORIZATION, header)
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
    use super::*;

    // Worked example from Twitter's "Creating a signature" guide.
    const CONSUMER_KEY: &str = "xvz1evFS4wEEPTGEFPHBog";
    const CONSUMER_SECRET: &str = "kAcSOqF21Fu85e7zjz7ZN2U4ZRhfV3WpwPAoE3Z7kBw";
    const TOKEN: &str = "370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb";
    const TOKEN_SECRET: &str = "LswwdoUaIvS8ltyTt5jkRh4J50vUPVVHtR2YPi5kE";
    const NONCE: &str = "kYjzVBB8Y0ZFabxSWbWovY3uYSQ2pTgmZeNu2VS4cg";
    const TIMESTAMP: i64 = 1318622958;
    const UPDATE_URL: &str = "https://api.twitter.com/1.1/statuses/update.json";
    const STATUS: &str = "Hello Ladies + Gentlemen, a signed OAuth request!";

    fn signer() -> Signer<'static> {
        Signer {
            consumer_key: CONSUMER_KEY,
            consumer_secret: CONSUMER_SECRET,
            token: Some((TOKEN, TOKEN_SECRET)),
        }
    }

    #[test]
    fn test_signature_matches_published_example() {
        let params = [
            ("status", STATUS),
            ("include_entities", "true"),
            ("oauth_consumer_key", CONSUMER_KEY),
            ("oauth_nonce", NONCE),
            ("oauth_signature_method", "HMAC-SHA1"),
            ("oauth_timestamp", "1318622958"),
            ("oauth_token", TOKEN),
            ("oauth_version", "1.0"),
        ];
        let signature = signer().signature("post", UPDATE_URL, &params).unwrap();
        assert_eq!(signature, "hCtSmYh+iHYCEqBWrE7C7hYmtUk=");
    }

    #[test]
    fn test_authorization_header_fields() {
        let header = signer()
            .authorization(
                "POST",
                UPDATE_URL,
                &[],
                &[("include_entities", "true"), ("status", STATUS)],
                NONCE,
                TIMESTAMP,
            )
            .unwrap();

        assert!(header.starts_with("OAuth oauth_consumer_key=\"xvz1evFS4wEEPTGEFPHBog\", "));
        assert!(header.contains("oauth_token=\"370773112-GmHxMAgYyLbNEtIKZeRNFsMKPR9EyMZeS9weJAEb\""));
        assert!(header.ends_with("oauth_signature=\"hCtSmYh%2BiHYCEqBWrE7C7hYmtUk%3D\""));
        assert!(!header.contains("status"));
    }

    #[test]
    fn test_request_token_signing_key_has_empty_token_secret() {
        let consumer_only = Signer {
            consumer_key: CONSUMER_KEY,
            consumer_secret: CONSUMER_SECRET,
            token: None,
        };
        let header = consumer_only
            .authorization(
                "POST",
                REQUEST_TOKEN_URL,
                &[("oauth_callback", "http://localhost:8080/auth/twitter/callback")],
                &[],
                NONCE,
                TIMESTAMP,
            )
            .unwrap();
        assert!(header.contains(
            "oauth_callback=\"http%3A%2F%2Flocalhost%3A8080%2Fauth%2Ftwitter%2Fcallback\""
        ));
        assert!(!header.contains("oauth_token="));
    }

    #[test]
    fn test_escape_keeps_unreserved_only() {
        assert_eq!(escape("a-b.c_d~e"), "a-b.c_d~e");
        assert_eq!(escape("Ladies + Gentlemen!"), "Ladies%20%2B%20Gentlemen%21");
        assert_eq!(escape("☃"), "%E2%98%83");
    }

    #[test]
    fn test_token_reply_parsing() {
        let reply = parse_token_reply(
            "oauth_token=NPcudxy0yU5T3tBzho7iCotZ3cnetKwcTIRlX0iwRl0&oauth_token_secret=veNRnAWe6inFuo8o2u8SLLZLjolYDmDP7SzL0YfYI&oauth_callback_confirmed=true",
        );
        assert_eq!(
            required(&reply, "oauth_token").unwrap(),
            "NPcudxy0yU5T3tBzho7iCotZ3cnetKwcTIRlX0iwRl0"
        );
        assert_eq!(reply["oauth_callback_confirmed"], "true");

        let err = required(&reply, "user_id").unwrap_err();
        assert_eq!(err.status_code(), 502);
    }

    #[test]
    fn test_callback_url_defaults_to_public_url() {
        let provider = OAuth1Provider::new(
            ProviderKind::Twitter,
            &OAuthClientConfig {
                client_id: "ck".into(),
                client_secret: "cs".into(),
                redirect_uri: None,
            },
            "https://rythm.example/",
        );
        assert_eq!(provider.name(), "twitter");
        assert_eq!(
            provider.callback_url,
            "https://rythm.example/auth/twitter/callback"
        );
    }

    #[tokio::test]
    async fn test_exchange_requires_request_secret() {
        let provider = OAuth1Provider::new(
            ProviderKind::Twitter,
            &OAuthClientConfig::default(),
            "http://localhost",
        );
        let grant = Grant {
            code: "verifier".into(),
            state: "request-token".into(),
            secret: None,
        };
        let err = provider.exchange(&grant).await.unwrap_err();
        assert!(matches!(err, RythmError::Provider(_)));
    }
}
