pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::app::Result;
use crate::domain::{Comment, NewUser, Reaction, Todo, TodoEdit, TodoQuery, User};

pub use sqlite::SqliteStore;

#[async_trait]
pub trait TodoStore: Send + Sync {
    async fn insert_todo(&self, todo: &Todo) -> Result<()>;
    async fn insert_todos(&self, todos: &[Todo]) -> Result<usize>;
    async fn get_todo(&self, todo_id: &str) -> Result<Option<Todo>>;
    async fn query_todos(&self, query: &TodoQuery) -> Result<Vec<Todo>>;
    async fn update_todo(&self, todo_id: &str, edit: &TodoEdit) -> Result<()>;
    async fn delete_todo(&self, todo_id: &str) -> Result<()>;
    async fn delete_user_todos(&self, user_id: &str) -> Result<usize>;
    async fn append_comment(&self, todo_id: &str, comment: &Comment) -> Result<()>;
    async fn thumb_audit(&self) -> Result<ThumbAudit>;
}

/// The operations the reaction engine needs. Each call is atomic on its
/// own; nothing groups several calls into a transaction.
#[async_trait]
pub trait ReactionStore: Send + Sync {
    async fn find_todo(&self, todo_id: &str) -> Result<Option<Todo>>;
    async fn has_reaction(&self, user_id: &str, todo_id: &str, reaction: Reaction)
        -> Result<bool>;
    /// Add `todo_id` to the user's set. Adding twice keeps one entry.
    /// True only when this call added it.
    async fn push_reaction(&self, user_id: &str, todo_id: &str, reaction: Reaction)
        -> Result<bool>;
    /// True only when this call removed it.
    async fn pull_reaction(&self, user_id: &str, todo_id: &str, reaction: Reaction)
        -> Result<bool>;
    /// In-place counter update, clamped at zero.
    async fn adjust_thumbs(&self, todo_id: &str, counter: Reaction, delta: i64) -> Result<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, user: &NewUser) -> Result<User>;
    async fn get_user(&self, user_id: &str) -> Result<Option<User>>;
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn find_user_by_provider(&self, provider: &str, provider_id: &str)
        -> Result<Option<User>>;
    async fn list_users(&self) -> Result<Vec<User>>;
    async fn activate_user(&self, activation_token: &str) -> Result<Option<User>>;
    async fn delete_user(&self, user_id: &str) -> Result<()>;
}

#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create_session(
        &self,
        token_hash: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()>;
    /// Owner of a live session, `None` when unknown or expired.
    async fn session_user(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<String>>;
    async fn delete_session(&self, token_hash: &str) -> Result<()>;
    async fn save_oauth_state(&self, pending: &PendingLogin, expires_at: DateTime<Utc>)
        -> Result<()>;
    /// Consume a pending login. `Some` only the first time for a live state.
    async fn take_oauth_state(&self, state: &str, provider: &str, now: DateTime<Utc>)
        -> Result<Option<PendingLogin>>;
}

/// A social login waiting for the provider's callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingLogin {
    /// Correlation key echoed back on the callback: the OAuth 2 `state`
    /// or the OAuth 1.0a request token.
    pub state: String,
    pub provider: String,
    /// Request token secret, OAuth 1.0a only.
    pub secret: Option<String>,
}

/// Everything the server needs from persistence.
pub trait Store: TodoStore + ReactionStore + UserStore + SessionStore {}

impl<T: TodoStore + ReactionStore + UserStore + SessionStore> Store for T {}

/// Counter drift found by [`TodoStore::thumb_audit`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterDrift {
    pub todo_id: String,
    pub thumbs_up: i64,
    pub thumbs_down: i64,
    pub liked_by: i64,
    pub not_liked_by: i64,
}

/// A user holding the same todo in both sets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoubleReaction {
    pub user_id: String,
    pub todo_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ThumbAudit {
    pub drifted: Vec<CounterDrift>,
    pub double_reactions: Vec<DoubleReaction>,
}

impl ThumbAudit {
    pub fn is_clean(&self) -> bool {
        self.drifted.is_empty() && self.double_reactions.is_empty()
    }
}
