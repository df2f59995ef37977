//! Request bodies. Every field is optional on the wire so that missing
//! fields surface as 422 with a readable message instead of a serde error.

use serde::{Deserialize, Serialize};

use crate::app::{Result, RythmError};
use crate::auth::{NewAccount, Session};
use crate::domain::{ChecklistEntry, NewTodo, Reaction, TodoEdit, UserSelfView};

/// Collects validation failures so a response can list all of them.
#[derive(Default)]
struct Problems(Vec<String>);

impl Problems {
    fn text(&mut self, value: Option<String>, message: &str) -> String {
        match value.map(|v| v.trim().to_string()) {
            Some(v) if !v.is_empty() => v,
            _ => {
                self.0.push(message.to_string());
                String::new()
            }
        }
    }

    fn check(&mut self, ok: bool, message: &str) {
        if !ok {
            self.0.push(message.to_string());
        }
    }

    fn finish<T>(self, value: T) -> Result<T> {
        if self.0.is_empty() {
            Ok(value)
        } else {
            Err(RythmError::Validation(self.0.join(", ")))
        }
    }
}

fn looks_like_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !email.chars().any(char::is_whitespace)
}

#[derive(Debug, Default, Deserialize)]
pub struct RegisterBody {
    pub email: Option<String>,
    pub password: Option<String>,
    pub fname: Option<String>,
    pub lname: Option<String>,
    pub username: Option<String>,
    pub role: Option<String>,
}

impl RegisterBody {
    pub fn validate(self) -> Result<NewAccount> {
        let mut p = Problems::default();
        let password = self.password.filter(|pw| !pw.is_empty());
        p.check(password.is_some(), "Password cannot be blank");
        let fname = p.text(self.fname, "First name must be specified");
        let lname = p.text(self.lname, "Last name must be specified");
        let username = p.text(self.username, "Username must be specified");
        let email = self.email.unwrap_or_default().trim().to_lowercase();
        p.check(looks_like_email(&email), "Email is not valid");

        p.finish(NewAccount {
            email,
            password: password.unwrap_or_default(),
            username,
            fname,
            lname,
            role: self.role.map(|r| r.trim().to_string()).filter(|r| !r.is_empty()),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LoginBody {
    pub email: Option<String>,
    pub password: Option<String>,
}

impl LoginBody {
    pub fn validate(self) -> Result<(String, String)> {
        let mut p = Problems::default();
        let email = self.email.unwrap_or_default().trim().to_lowercase();
        p.check(looks_like_email(&email), "Email is not valid");
        let password = self.password.unwrap_or_default();
        p.check(!password.is_empty(), "Password cannot be blank");
        p.finish((email, password))
    }
}

/// A todo as submitted by a client. `user_id` / `username` in the body are
/// ignored; the owner is always the caller.
#[derive(Debug, Default, Deserialize)]
pub struct TodoBody {
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub private: Option<bool>,
    pub list: Option<Vec<ChecklistEntry>>,
    pub master_id: Option<String>,
}

impl TodoBody {
    pub fn validate(self) -> Result<NewTodo> {
        let mut p = Problems::default();
        p.check(self.private.is_some(), "private is empty");
        let title = p.text(self.title, "title is empty");
        let description = p.text(self.description, "description is empty");
        let category = p.text(self.category, "category is empty");
        let list = self.list.unwrap_or_default();
        p.check(!list.is_empty(), "list is empty");
        p.check(
            list.iter().all(|e| !e.item_name.trim().is_empty()),
            "list item_name is empty",
        );

        p.finish(NewTodo {
            title,
            description,
            category,
            private: self.private.unwrap_or_default(),
            list,
            master_id: self.master_id.filter(|id| !id.trim().is_empty()),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct InsertManyBody {
    pub todos: Option<Vec<TodoBody>>,
}

impl InsertManyBody {
    pub fn validate(self) -> Result<Vec<NewTodo>> {
        let todos = self.todos.unwrap_or_default();
        if todos.is_empty() {
            return Err(RythmError::Validation("todos is empty".to_string()));
        }
        todos
            .into_iter()
            .enumerate()
            .map(|(i, body)| {
                body.validate()
                    .map_err(|e| RythmError::Validation(format!("todos[{i}]: {e}")))
            })
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EditBody {
    pub todo_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub private: Option<bool>,
    pub list: Option<Vec<ChecklistEntry>>,
}

impl EditBody {
    pub fn validate(self) -> Result<(String, TodoEdit)> {
        let mut p = Problems::default();
        let todo_id = p.text(self.todo_id, "todo_id is empty");

        let mut optional = |value: Option<String>, message: &str| {
            value.map(|v| p.text(Some(v), message))
        };
        let title = optional(self.title, "title is empty");
        let description = optional(self.description, "description is empty");
        let category = optional(self.category, "category is empty");

        if let Some(list) = &self.list {
            p.check(!list.is_empty(), "list is empty");
        }

        let edit = TodoEdit {
            title,
            description,
            category,
            private: self.private,
            list: self.list,
        };
        p.check(!edit.is_empty(), "No editable fields present with request");
        p.finish((todo_id, edit))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ThumbsBody {
    pub todo_id: Option<String>,
    pub thumb: Option<String>,
}

impl ThumbsBody {
    pub fn validate(self) -> Result<(String, Reaction)> {
        let mut p = Problems::default();
        let todo_id = p.text(self.todo_id, "todo_id is empty");
        let reaction = self.thumb.as_deref().and_then(Reaction::parse);
        p.check(reaction.is_some(), "thumb must be 'thumbUp' or 'thumbDown'");
        p.finish((todo_id, reaction.unwrap_or(Reaction::Up)))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CommentBody {
    pub todo_id: Option<String>,
    pub text: Option<String>,
}

impl CommentBody {
    pub fn validate(self) -> Result<(String, String)> {
        let mut p = Problems::default();
        let todo_id = p.text(self.todo_id, "todo_id is empty");
        let text = p.text(self.text, "text is empty");
        p.finish((todo_id, text))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct EmailQuery {
    pub email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UsernameQuery {
    pub username: Option<String>,
}

/// Provider callback. OAuth 2 sends `code` and `state`, OAuth 1.0a sends
/// `oauth_token` and `oauth_verifier`.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub oauth_token: Option<String>,
    pub oauth_verifier: Option<String>,
    pub denied: Option<String>,
}

impl CallbackQuery {
    /// `(code, state)` for either protocol.
    pub fn grant(self, provider: &str) -> Result<(String, String)> {
        if let Some(error) = self.error {
            return Err(RythmError::Unauthorized(format!(
                "{provider} login was not completed: {error}"
            )));
        }
        if self.denied.is_some() {
            return Err(RythmError::Unauthorized(format!(
                "{provider} login was not completed: access denied"
            )));
        }

        match (
            self.code.or(self.oauth_verifier),
            self.state.or(self.oauth_token),
        ) {
            (Some(code), Some(state)) => Ok((code, state)),
            _ => Err(RythmError::Validation(
                "code and state are required".to_string(),
            )),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ExistsResponse {
    pub exists: bool,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user: UserSelfView,
}

impl From<Session> for SessionResponse {
    fn from(session: Session) -> Self {
        Self {
            token: session.token,
            user: session.user.self_view(),
        }
    }
}
