use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

pub const DEFAULT_ROLE: &str = "user";

/// Stored password credentials, both hex encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordHash {
    pub hash: String,
    pub salt: String,
}

/// Account as persisted. Never serialized directly; see [`UserSelfView`]
/// and [`UserPublicView`].
#[derive(Debug, Clone)]
pub struct User {
    pub id: i64,
    pub user_id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub fname: Option<String>,
    pub lname: Option<String>,
    pub role: String,
    pub password: Option<PasswordHash>,
    pub active: bool,
    pub activation_token: Option<String>,
    pub provider: Option<String>,
    pub provider_id: Option<String>,
    pub liked: Vec<String>,
    pub not_liked: Vec<String>,
    pub interests: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn generate_id() -> String {
        format!("rythm-{}", Uuid::new_v4().simple())
    }

    /// Name shown on the user's todos.
    pub fn handle(&self) -> &str {
        self.username
            .as_deref()
            .or(self.display_name.as_deref())
            .unwrap_or(&self.user_id)
    }

    pub fn self_view(&self) -> UserSelfView {
        UserSelfView {
            id: self.id.to_string(),
            email: self.email.clone(),
            role: self.role.clone(),
            username: self.username.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            user_id: self.user_id.clone(),
            liked: self.liked.clone(),
            not_liked: self.not_liked.clone(),
            interests: self.interests.clone(),
        }
    }

    pub fn public_view(&self) -> UserPublicView {
        UserPublicView {
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            role: self.role.clone(),
            interests: self.interests.clone(),
            created_at: self.created_at,
        }
    }
}

/// What a user sees about themselves.
#[derive(Debug, Clone, Serialize)]
pub struct UserSelfView {
    #[serde(rename = "_id")]
    pub id: String,
    pub email: Option<String>,
    pub role: String,
    pub username: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
    pub user_id: String,
    pub liked: Vec<String>,
    #[serde(rename = "notLiked")]
    pub not_liked: Vec<String>,
    pub interests: Vec<String>,
}

/// What everybody else sees.
#[derive(Debug, Clone, Serialize)]
pub struct UserPublicView {
    pub user_id: String,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub role: String,
    pub interests: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
}

/// A user about to be created, either from registration or social login.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub user_id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub display_name: Option<String>,
    pub fname: Option<String>,
    pub lname: Option<String>,
    pub role: String,
    pub password: Option<PasswordHash>,
    pub active: bool,
    pub activation_token: Option<String>,
    pub provider: Option<String>,
    pub provider_id: Option<String>,
}

impl NewUser {
    pub fn new(email: Option<String>, username: Option<String>) -> Self {
        Self {
            user_id: User::generate_id(),
            email,
            username,
            display_name: None,
            fname: None,
            lname: None,
            role: DEFAULT_ROLE.to_string(),
            password: None,
            active: true,
            activation_token: None,
            provider: None,
            provider_id: None,
        }
    }
}
