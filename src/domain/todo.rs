use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One line of a checklist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistEntry {
    pub item_name: String,
    pub status: String,
    #[serde(default)]
    pub instructions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub user_id: String,
    pub text: String,
    pub date: DateTime<Utc>,
}

impl Comment {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
            date: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Todo {
    pub todo_id: String,
    pub master: bool,
    pub master_id: String,
    pub user_id: String,
    pub username: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub private: bool,
    pub thumbs_up: i64,
    pub thumbs_down: i64,
    pub list: Vec<ChecklistEntry>,
    pub comments: Vec<Comment>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl Todo {
    /// Builds a fresh todo owned by `user_id`. Counters start at zero.
    ///
    /// Without a `master_id` the todo is its own master.
    pub fn new(
        user_id: impl Into<String>,
        username: impl Into<String>,
        draft: NewTodo,
        master_id: Option<String>,
    ) -> Self {
        let todo_id = Self::generate_id();
        let now = Utc::now();
        let (master, master_id) = match master_id {
            Some(id) => (false, id),
            None => (true, todo_id.clone()),
        };

        Self {
            todo_id,
            master,
            master_id,
            user_id: user_id.into(),
            username: username.into(),
            title: draft.title,
            description: draft.description,
            category: draft.category,
            private: draft.private,
            thumbs_up: 0,
            thumbs_down: 0,
            list: draft.list,
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn generate_id() -> String {
        format!("todo-{}", Uuid::new_v4().simple())
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id == user_id
    }

    /// Whether `viewer` may see this todo in query results.
    pub fn visible_to(&self, viewer: Option<&str>) -> bool {
        !self.private || viewer.is_some_and(|v| self.is_owned_by(v))
    }
}

/// Validated content of a todo about to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTodo {
    pub title: String,
    pub description: String,
    pub category: String,
    pub private: bool,
    pub list: Vec<ChecklistEntry>,
    pub master_id: Option<String>,
}

/// Editable fields of a todo. `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TodoEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub private: Option<bool>,
    pub list: Option<Vec<ChecklistEntry>>,
}

impl TodoEdit {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.category.is_none()
            && self.private.is_none()
            && self.list.is_none()
    }
}
