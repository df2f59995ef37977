use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{info, warn};

use crate::app::{Result, RythmError};
use crate::auth::mailer::Mailer;
use crate::auth::oauth::{Grant, IdentityProvider, SocialProfile};
use crate::auth::password::{hash_password_off_thread, verify_password_off_thread};
use crate::auth::session::{generate_token, hash_token};
use crate::config::AuthConfig;
use crate::domain::{NewUser, User};
use crate::store::{PendingLogin, Store};

const OAUTH_STATE_TTL_MINUTES: i64 = 10;

/// Local account registration, already validated.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub username: String,
    pub fname: String,
    pub lname: String,
    pub role: Option<String>,
}

/// A freshly issued session.
#[derive(Debug, Clone)]
pub struct Session {
    pub token: String,
    pub user: User,
}

/// Accounts, credentials and bearer sessions.
pub struct AuthService {
    store: Arc<dyn Store>,
    mailer: Arc<dyn Mailer>,
    providers: HashMap<String, Arc<dyn IdentityProvider>>,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(store: Arc<dyn Store>, mailer: Arc<dyn Mailer>, config: AuthConfig) -> Self {
        Self {
            store,
            mailer,
            providers: HashMap::new(),
            config,
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn IdentityProvider>) -> Self {
        self.providers
            .insert(provider.name().to_string(), provider);
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub async fn register(&self, account: NewAccount) -> Result<User> {
        let email = normalize_email(&account.email);
        let username = account.username.trim().to_string();

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(RythmError::Conflict("Email already in use".to_string()));
        }
        if self.store.find_user_by_username(&username).await?.is_some() {
            return Err(RythmError::Conflict("Username already in use".to_string()));
        }

        let mut new_user = NewUser::new(Some(email.clone()), Some(username));
        new_user.fname = Some(account.fname);
        new_user.lname = Some(account.lname);
        if let Some(role) = account.role {
            new_user.role = role;
        }
        new_user.password = Some(
            hash_password_off_thread(account.password, self.config.password_rounds).await?,
        );
        if self.config.activation_required {
            new_user.active = false;
            new_user.activation_token = Some(generate_token());
        }

        let user = self.store.create_user(&new_user).await?;
        info!(user_id = %user.user_id, "Registered account");

        if let Some(token) = &user.activation_token {
            let link = format!(
                "{}/auth/activate/{token}",
                self.config.public_url.trim_end_matches('/')
            );
            self.mailer.send_activation(&email, &link).await?;
        }

        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        let email = normalize_email(email);
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| RythmError::UserNotFound(email.clone()))?;

        let verified = match user.password.clone() {
            Some(stored) => {
                verify_password_off_thread(
                    password.to_string(),
                    stored,
                    self.config.password_rounds,
                )
                .await?
            }
            None => false,
        };
        if !verified {
            warn!(user_id = %user.user_id, "Rejected login");
            return Err(RythmError::Unauthorized("Invalid credentials".to_string()));
        }
        if !user.active {
            return Err(RythmError::Unauthorized(
                "Account has not been activated".to_string(),
            ));
        }

        self.issue_session(user).await
    }

    pub async fn activate(&self, activation_token: &str) -> Result<Session> {
        let user = self
            .store
            .activate_user(activation_token)
            .await?
            .ok_or_else(|| {
                RythmError::BadRequest("Activation token expired, please register again".to_string())
            })?;
        info!(user_id = %user.user_id, "Activated account");
        self.issue_session(user).await
    }

    /// Resolve a bearer token to its user.
    pub async fn authenticate(&self, token: &str) -> Result<User> {
        let unauthorized = || RythmError::Unauthorized("unauthorized".to_string());

        let user_id = self
            .store
            .session_user(&hash_token(token), Utc::now())
            .await?
            .ok_or_else(unauthorized)?;
        self.store.get_user(&user_id).await?.ok_or_else(unauthorized)
    }

    pub async fn logout(&self, token: &str) -> Result<()> {
        self.store.delete_session(&hash_token(token)).await
    }

    pub async fn email_exists(&self, email: &str) -> Result<bool> {
        Ok(self
            .store
            .find_user_by_email(&normalize_email(email))
            .await?
            .is_some())
    }

    pub async fn username_exists(&self, username: &str) -> Result<bool> {
        Ok(self
            .store
            .find_user_by_username(username.trim())
            .await?
            .is_some())
    }

    /// Start a social login: remember the pending login and return the
    /// provider's authorize URL.
    pub async fn begin_social_login(&self, provider: &str) -> Result<String> {
        let provider = self.provider(provider)?;
        let start = provider.start(&generate_token()).await?;
        let expires_at = Utc::now() + Duration::minutes(OAUTH_STATE_TTL_MINUTES);

        let pending = PendingLogin {
            state: start.state,
            provider: provider.name().to_string(),
            secret: start.secret,
        };
        self.store.save_oauth_state(&pending, expires_at).await?;
        Ok(start.url)
    }

    /// Finish a social login. `state` is the OAuth 2 state or the OAuth
    /// 1.0a request token; `code` the authorization code or verifier.
    pub async fn finish_social_login(&self, provider: &str, code: &str, state: &str) -> Result<Session> {
        let provider = self.provider(provider)?;

        let Some(pending) = self
            .store
            .take_oauth_state(state, provider.name(), Utc::now())
            .await?
        else {
            warn!(provider = provider.name(), "Unknown or expired OAuth state");
            return Err(RythmError::Unauthorized(
                "Invalid or expired login attempt".to_string(),
            ));
        };

        let grant = Grant {
            code: code.to_string(),
            state: pending.state,
            secret: pending.secret,
        };
        let profile = provider.exchange(&grant).await?;
        let user = self.upsert_social_user(profile).await?;
        self.issue_session(user).await
    }

    /// Remove an account together with the todos it owns.
    pub async fn delete_account(&self, user_id: &str) -> Result<()> {
        let removed = self.store.delete_user_todos(user_id).await?;
        self.store.delete_user(user_id).await?;
        info!(user_id, removed, "Deleted account");
        Ok(())
    }

    async fn upsert_social_user(&self, profile: SocialProfile) -> Result<User> {
        if let Some(user) = self
            .store
            .find_user_by_provider(&profile.provider, &profile.provider_id)
            .await?
        {
            return Ok(user);
        }

        let mut new_user = NewUser::new(profile.email, profile.username);
        new_user.display_name = profile.display_name;
        new_user.fname = profile.fname;
        new_user.lname = profile.lname;
        new_user.provider = Some(profile.provider);
        new_user.provider_id = Some(profile.provider_id);

        let created = self.store.create_user(&new_user).await;
        match created {
            Err(RythmError::Conflict(_)) => {
                // Email or username already belongs to another account.
                warn!(
                    provider = ?new_user.provider,
                    "Social profile collides with an existing account, storing without email and username"
                );
                new_user.email = None;
                new_user.username = None;
                self.store.create_user(&new_user).await
            }
            created => created,
        }
    }

    async fn issue_session(&self, user: User) -> Result<Session> {
        let token = generate_token();
        let expires_at = Utc::now() + Duration::hours(self.config.session_ttl_hours);
        self.store
            .create_session(&hash_token(&token), &user.user_id, expires_at)
            .await?;
        Ok(Session { token, user })
    }

    fn provider(&self, name: &str) -> Result<&Arc<dyn IdentityProvider>> {
        self.providers
            .get(&name.to_ascii_lowercase())
            .ok_or_else(|| RythmError::NotFound(format!("Unknown identity provider: {name}")))
    }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
