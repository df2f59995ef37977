use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, OptionalExtension, Row};
use rusqlite_migration::{Migrations, M};

use crate::app::{Result, RythmError};
use crate::domain::{Comment, NewUser, PasswordHash, Reaction, Todo, TodoEdit, TodoQuery, User};
use crate::store::{
    CounterDrift, DoubleReaction, PendingLogin, ReactionStore, SessionStore, ThumbAudit,
    TodoStore, UserStore,
};

const TODO_COLUMNS: &str = "t.todo_id, t.master, t.master_id, t.user_id, t.username, t.title,
    t.description, t.category, t.private, t.thumbs_up, t.thumbs_down, t.list, t.created_at,
    t.updated_at";

const USER_COLUMNS: &str = "id, user_id, email, username, display_name, fname, lname, role,
    password_hash, password_salt, active, activation_token, provider, provider_id, interests,
    created_at, updated_at";

/// One SQLite connection shared by all callers. Statements run on tokio's
/// blocking pool so waiting for the lock never parks a runtime worker.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.run_migrations()?;
        Ok(store)
    }

    fn run_migrations(&self) -> Result<()> {
        let migrations = Migrations::new(vec![
            M::up(include_str!("../../migrations/001-initial/up.sql")),
            M::up(include_str!("../../migrations/002-oauth-secret/up.sql")),
        ]);

        let mut conn = self.lock()?;

        conn.execute("PRAGMA foreign_keys = ON", [])?;
        migrations
            .to_latest(&mut conn)
            .map_err(|e| RythmError::Config(format!("Database migration failed: {e}")))?;

        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| Self::poisoned(e.to_string()))
    }

    fn poisoned(reason: String) -> RythmError {
        RythmError::StoreUnavailable(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(1),
            Some(reason),
        ))
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| Self::poisoned(e.to_string()))?;
            f(&mut conn)
        })
        .await?
    }

    fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.with_timezone(&Utc))
            .ok()
            .or_else(|| s.parse::<DateTime<Utc>>().ok())
    }

    fn datetime_column(row: &Row, idx: usize) -> DateTime<Utc> {
        row.get::<_, String>(idx)
            .ok()
            .and_then(|s| Self::parse_datetime(&s))
            .unwrap_or_else(Utc::now)
    }

    /// Todo without list and comments, plus the raw list JSON.
    fn todo_from_row(row: &Row) -> rusqlite::Result<(Todo, String)> {
        let todo = Todo {
            todo_id: row.get(0)?,
            master: row.get::<_, i32>(1)? != 0,
            master_id: row.get(2)?,
            user_id: row.get(3)?,
            username: row.get(4)?,
            title: row.get(5)?,
            description: row.get(6)?,
            category: row.get(7)?,
            private: row.get::<_, i32>(8)? != 0,
            thumbs_up: row.get(9)?,
            thumbs_down: row.get(10)?,
            list: Vec::new(),
            comments: Vec::new(),
            created_at: Self::datetime_column(row, 12),
            updated_at: Self::datetime_column(row, 13),
        };
        Ok((todo, row.get(11)?))
    }

    fn hydrate_todo(conn: &Connection, (mut todo, list): (Todo, String)) -> Result<Todo> {
        todo.list = serde_json::from_str(&list)?;

        let mut stmt = conn.prepare(
            "SELECT user_id, text, date FROM comments WHERE todo_id = ?1 ORDER BY id ASC",
        )?;
        todo.comments = stmt
            .query_map(params![todo.todo_id], |row| {
                Ok(Comment {
                    user_id: row.get(0)?,
                    text: row.get(1)?,
                    date: Self::datetime_column(row, 2),
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(todo)
    }

    fn load_todo(conn: &Connection, todo_id: &str) -> Result<Option<Todo>> {
        let row = conn
            .query_row(
                &format!("SELECT {TODO_COLUMNS} FROM todos t WHERE t.todo_id = ?1"),
                params![todo_id],
                Self::todo_from_row,
            )
            .optional()?;

        row.map(|r| Self::hydrate_todo(conn, r)).transpose()
    }

    fn write_todo(conn: &Connection, todo: &Todo) -> Result<usize> {
        let inserted = conn.execute(
            "INSERT INTO todos (todo_id, master, master_id, user_id, username, title, description,
                category, private, thumbs_up, thumbs_down, list, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                todo.todo_id,
                todo.master as i32,
                todo.master_id,
                todo.user_id,
                todo.username,
                todo.title,
                todo.description,
                todo.category,
                todo.private as i32,
                todo.thumbs_up,
                todo.thumbs_down,
                serde_json::to_string(&todo.list)?,
                todo.created_at.to_rfc3339(),
                todo.updated_at.to_rfc3339()
            ],
        )?;

        for comment in &todo.comments {
            Self::write_comment(conn, &todo.todo_id, comment)?;
        }

        Ok(inserted)
    }

    fn write_comment(conn: &Connection, todo_id: &str, comment: &Comment) -> Result<()> {
        conn.execute(
            "INSERT INTO comments (todo_id, user_id, text, date) VALUES (?1, ?2, ?3, ?4)",
            params![
                todo_id,
                comment.user_id,
                comment.text,
                comment.date.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    /// Full-text expression for a free-form search string: each word is a
    /// quoted phrase and any of them may match.
    fn match_expression(search: &str) -> Option<String> {
        let terms: Vec<String> = search
            .split_whitespace()
            .filter(|t| t.chars().any(char::is_alphanumeric))
            .map(|t| format!("\"{}\"", t.replace('"', "\"\"")))
            .collect();

        if terms.is_empty() {
            None
        } else {
            Some(terms.join(" OR "))
        }
    }

    fn user_from_row(row: &Row) -> rusqlite::Result<(User, String)> {
        let hash: Option<String> = row.get(8)?;
        let salt: Option<String> = row.get(9)?;
        let password = match (hash, salt) {
            (Some(hash), Some(salt)) => Some(PasswordHash { hash, salt }),
            _ => None,
        };

        let user = User {
            id: row.get(0)?,
            user_id: row.get(1)?,
            email: row.get(2)?,
            username: row.get(3)?,
            display_name: row.get(4)?,
            fname: row.get(5)?,
            lname: row.get(6)?,
            role: row.get(7)?,
            password,
            active: row.get::<_, i32>(10)? != 0,
            activation_token: row.get(11)?,
            provider: row.get(12)?,
            provider_id: row.get(13)?,
            liked: Vec::new(),
            not_liked: Vec::new(),
            interests: Vec::new(),
            created_at: Self::datetime_column(row, 15),
            updated_at: Self::datetime_column(row, 16),
        };
        Ok((user, row.get(14)?))
    }

    fn hydrate_user(conn: &Connection, (mut user, interests): (User, String)) -> Result<User> {
        user.interests = serde_json::from_str(&interests)?;

        let mut stmt = conn.prepare(
            "SELECT todo_id, kind FROM user_reactions WHERE user_id = ?1 ORDER BY rowid ASC",
        )?;
        let rows = stmt
            .query_map(params![user.user_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for (todo_id, kind) in rows {
            if kind == Reaction::Up.set_name() {
                user.liked.push(todo_id);
            } else {
                user.not_liked.push(todo_id);
            }
        }

        Ok(user)
    }

    fn load_user_where(conn: &Connection, clause: &str, values: &[&str]) -> Result<Option<User>> {
        let row = conn
            .query_row(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE {clause}"),
                params_from_iter(values.iter()),
                Self::user_from_row,
            )
            .optional()?;

        row.map(|r| Self::hydrate_user(conn, r)).transpose()
    }

    fn is_constraint_violation(e: &rusqlite::Error) -> bool {
        matches!(
            e,
            rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation
        )
    }
}

#[async_trait]
impl TodoStore for SqliteStore {
    async fn insert_todo(&self, todo: &Todo) -> Result<()> {
        let todo = todo.clone();
        self.run(move |conn| {
            Self::write_todo(conn, &todo)?;
            Ok(())
        })
        .await
    }

    async fn insert_todos(&self, todos: &[Todo]) -> Result<usize> {
        let todos = todos.to_vec();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let mut count = 0;

            for todo in &todos {
                count += Self::write_todo(&tx, todo)?;
            }

            tx.commit()?;
            Ok(count)
        })
        .await
    }

    async fn get_todo(&self, todo_id: &str) -> Result<Option<Todo>> {
        let todo_id = todo_id.to_string();
        self.run(move |conn| Self::load_todo(conn, &todo_id)).await
    }

    async fn query_todos(&self, query: &TodoQuery) -> Result<Vec<Todo>> {
        let query = query.clone();
        self.run(move |conn| {
            let mut clauses = Vec::new();
            let mut values: Vec<String> = Vec::new();

            for (column, value) in [
                ("t.todo_id", &query.todo_id),
                ("t.user_id", &query.user_id),
                ("t.username", &query.username),
                ("t.category", &query.category),
            ] {
                if let Some(value) = value {
                    values.push(value.clone());
                    clauses.push(format!("{column} = ?{}", values.len()));
                }
            }

            let sql = match &query.search {
                Some(search) => {
                    let Some(expression) = Self::match_expression(search) else {
                        return Ok(Vec::new());
                    };
                    values.push(expression);
                    clauses.push(format!("todo_search MATCH ?{}", values.len()));
                    format!(
                        "SELECT {TODO_COLUMNS} FROM todo_search
                         JOIN todos t ON t.todo_id = todo_search.todo_id
                         WHERE {}
                         ORDER BY bm25(todo_search) ASC, t.created_at ASC",
                        clauses.join(" AND ")
                    )
                }
                None => {
                    let filter = if clauses.is_empty() {
                        String::new()
                    } else {
                        format!(" WHERE {}", clauses.join(" AND "))
                    };
                    format!("SELECT {TODO_COLUMNS} FROM todos t{filter} ORDER BY t.created_at DESC")
                }
            };

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params_from_iter(values.iter()), Self::todo_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|r| Self::hydrate_todo(conn, r))
                .collect()
        })
        .await
    }

    async fn update_todo(&self, todo_id: &str, edit: &TodoEdit) -> Result<()> {
        let todo_id = todo_id.to_string();
        let edit = edit.clone();
        self.run(move |conn| {
            let mut sets = Vec::new();
            let mut values: Vec<Value> = Vec::new();

            if let Some(ref title) = edit.title {
                values.push(Value::Text(title.clone()));
                sets.push(format!("title = ?{}", values.len()));
            }
            if let Some(ref description) = edit.description {
                values.push(Value::Text(description.clone()));
                sets.push(format!("description = ?{}", values.len()));
            }
            if let Some(ref category) = edit.category {
                values.push(Value::Text(category.clone()));
                sets.push(format!("category = ?{}", values.len()));
            }
            if let Some(private) = edit.private {
                values.push(Value::Integer(private as i64));
                sets.push(format!("private = ?{}", values.len()));
            }
            if let Some(ref list) = edit.list {
                values.push(Value::Text(serde_json::to_string(list)?));
                sets.push(format!("list = ?{}", values.len()));
            }

            values.push(Value::Text(Utc::now().to_rfc3339()));
            sets.push(format!("updated_at = ?{}", values.len()));
            values.push(Value::Text(todo_id.clone()));

            let sql = format!(
                "UPDATE todos SET {} WHERE todo_id = ?{}",
                sets.join(", "),
                values.len()
            );
            let changed = conn.execute(&sql, params_from_iter(values.iter()))?;
            if changed == 0 {
                return Err(RythmError::TodoNotFound(todo_id));
            }

            Ok(())
        })
        .await
    }

    async fn delete_todo(&self, todo_id: &str) -> Result<()> {
        let todo_id = todo_id.to_string();
        self.run(move |conn| {
            conn.execute("DELETE FROM todos WHERE todo_id = ?1", params![todo_id])?;
            Ok(())
        })
        .await
    }

    async fn delete_user_todos(&self, user_id: &str) -> Result<usize> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            let deleted = conn.execute("DELETE FROM todos WHERE user_id = ?1", params![user_id])?;
            Ok(deleted)
        })
        .await
    }

    async fn append_comment(&self, todo_id: &str, comment: &Comment) -> Result<()> {
        let todo_id = todo_id.to_string();
        let comment = comment.clone();
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let changed = tx.execute(
                "UPDATE todos SET updated_at = ?1 WHERE todo_id = ?2",
                params![Utc::now().to_rfc3339(), todo_id],
            )?;
            if changed == 0 {
                return Err(RythmError::TodoNotFound(todo_id));
            }
            Self::write_comment(&tx, &todo_id, &comment)?;
            tx.commit()?;

            Ok(())
        })
        .await
    }

    async fn thumb_audit(&self) -> Result<ThumbAudit> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT t.todo_id, t.thumbs_up, t.thumbs_down,
                    (SELECT COUNT(*) FROM user_reactions r
                     WHERE r.todo_id = t.todo_id AND r.kind = 'liked'),
                    (SELECT COUNT(*) FROM user_reactions r
                     WHERE r.todo_id = t.todo_id AND r.kind = 'not_liked')
                 FROM todos t ORDER BY t.todo_id",
            )?;
            let drifted = stmt
                .query_map([], |row| {
                    Ok(CounterDrift {
                        todo_id: row.get(0)?,
                        thumbs_up: row.get(1)?,
                        thumbs_down: row.get(2)?,
                        liked_by: row.get(3)?,
                        not_liked_by: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?
                .into_iter()
                .filter(|d| d.thumbs_up != d.liked_by || d.thumbs_down != d.not_liked_by)
                .collect();

            let mut stmt = conn.prepare(
                "SELECT user_id, todo_id FROM user_reactions
                 GROUP BY user_id, todo_id HAVING COUNT(*) > 1
                 ORDER BY user_id, todo_id",
            )?;
            let double_reactions = stmt
                .query_map([], |row| {
                    Ok(DoubleReaction {
                        user_id: row.get(0)?,
                        todo_id: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(ThumbAudit {
                drifted,
                double_reactions,
            })
        })
        .await
    }
}

#[async_trait]
impl ReactionStore for SqliteStore {
    async fn find_todo(&self, todo_id: &str) -> Result<Option<Todo>> {
        self.get_todo(todo_id).await
    }

    async fn has_reaction(
        &self,
        user_id: &str,
        todo_id: &str,
        reaction: Reaction,
    ) -> Result<bool> {
        let (user_id, todo_id) = (user_id.to_string(), todo_id.to_string());
        self.run(move |conn| {
            let found: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM user_reactions
                    WHERE user_id = ?1 AND todo_id = ?2 AND kind = ?3)",
                params![user_id, todo_id, reaction.set_name()],
                |row| row.get(0),
            )?;
            Ok(found)
        })
        .await
    }

    async fn push_reaction(
        &self,
        user_id: &str,
        todo_id: &str,
        reaction: Reaction,
    ) -> Result<bool> {
        let (user_id, todo_id) = (user_id.to_string(), todo_id.to_string());
        self.run(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO user_reactions (user_id, todo_id, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    user_id,
                    todo_id,
                    reaction.set_name(),
                    Utc::now().to_rfc3339()
                ],
            )?;
            Ok(inserted == 1)
        })
        .await
    }

    async fn pull_reaction(
        &self,
        user_id: &str,
        todo_id: &str,
        reaction: Reaction,
    ) -> Result<bool> {
        let (user_id, todo_id) = (user_id.to_string(), todo_id.to_string());
        self.run(move |conn| {
            let removed = conn.execute(
                "DELETE FROM user_reactions WHERE user_id = ?1 AND todo_id = ?2 AND kind = ?3",
                params![user_id, todo_id, reaction.set_name()],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn adjust_thumbs(&self, todo_id: &str, counter: Reaction, delta: i64) -> Result<()> {
        let todo_id = todo_id.to_string();
        self.run(move |conn| {
            let column = counter.counter_column();
            let changed = conn.execute(
                &format!(
                    "UPDATE todos SET {column} = MAX({column} + ?1, 0), updated_at = ?2
                     WHERE todo_id = ?3"
                ),
                params![delta, Utc::now().to_rfc3339(), todo_id],
            )?;
            if changed == 0 {
                return Err(RythmError::TodoNotFound(todo_id));
            }
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let user = user.clone();
        self.run(move |conn| {
            let now = Utc::now().to_rfc3339();

            let result = conn.execute(
                "INSERT INTO users (user_id, email, username, display_name, fname, lname, role,
                    password_hash, password_salt, active, activation_token, provider, provider_id,
                    interests, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, '[]', ?14, ?14)",
                params![
                    user.user_id,
                    user.email,
                    user.username,
                    user.display_name,
                    user.fname,
                    user.lname,
                    user.role,
                    user.password.as_ref().map(|p| p.hash.as_str()),
                    user.password.as_ref().map(|p| p.salt.as_str()),
                    user.active as i32,
                    user.activation_token,
                    user.provider,
                    user.provider_id,
                    now
                ],
            );

            match result {
                Ok(_) => {}
                Err(e) if Self::is_constraint_violation(&e) => {
                    return Err(RythmError::Conflict("User already exists".to_string()));
                }
                Err(e) => return Err(e.into()),
            }

            Self::load_user_where(conn, "user_id = ?1", &[user.user_id.as_str()])?
                .ok_or_else(|| RythmError::UserNotFound(user.user_id.clone()))
        })
        .await
    }

    async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let user_id = user_id.to_string();
        self.run(move |conn| Self::load_user_where(conn, "user_id = ?1", &[user_id.as_str()]))
            .await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>> {
        let email = email.to_string();
        self.run(move |conn| Self::load_user_where(conn, "email = ?1", &[email.as_str()]))
            .await
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let username = username.to_string();
        self.run(move |conn| Self::load_user_where(conn, "username = ?1", &[username.as_str()]))
            .await
    }

    async fn find_user_by_provider(
        &self,
        provider: &str,
        provider_id: &str,
    ) -> Result<Option<User>> {
        let (provider, provider_id) = (provider.to_string(), provider_id.to_string());
        self.run(move |conn| {
            Self::load_user_where(
                conn,
                "provider = ?1 AND provider_id = ?2",
                &[provider.as_str(), provider_id.as_str()],
            )
        })
        .await
    }

    async fn list_users(&self) -> Result<Vec<User>> {
        self.run(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id ASC"))?;
            let rows = stmt
                .query_map([], Self::user_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|r| Self::hydrate_user(conn, r))
                .collect()
        })
        .await
    }

    async fn activate_user(&self, activation_token: &str) -> Result<Option<User>> {
        let activation_token = activation_token.to_string();
        self.run(move |conn| {
            let user_id: Option<String> = conn
                .query_row(
                    "SELECT user_id FROM users WHERE activation_token = ?1",
                    params![activation_token],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(user_id) = user_id else {
                return Ok(None);
            };

            conn.execute(
                "UPDATE users SET active = 1, activation_token = NULL, updated_at = ?1
                 WHERE user_id = ?2",
                params![Utc::now().to_rfc3339(), user_id],
            )?;

            Self::load_user_where(conn, "user_id = ?1", &[user_id.as_str()])
        })
        .await
    }

    async fn delete_user(&self, user_id: &str) -> Result<()> {
        let user_id = user_id.to_string();
        self.run(move |conn| {
            conn.execute("DELETE FROM users WHERE user_id = ?1", params![user_id])?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl SessionStore for SqliteStore {
    async fn create_session(
        &self,
        token_hash: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let (token_hash, user_id) = (token_hash.to_string(), user_id.to_string());
        self.run(move |conn| {
            conn.execute(
                "INSERT INTO sessions (token_hash, user_id, created_at, expires_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    token_hash,
                    user_id,
                    Utc::now().to_rfc3339(),
                    expires_at.timestamp()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn session_user(&self, token_hash: &str, now: DateTime<Utc>) -> Result<Option<String>> {
        let token_hash = token_hash.to_string();
        self.run(move |conn| {
            let user_id = conn
                .query_row(
                    "SELECT user_id FROM sessions WHERE token_hash = ?1 AND expires_at > ?2",
                    params![token_hash, now.timestamp()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(user_id)
        })
        .await
    }

    async fn delete_session(&self, token_hash: &str) -> Result<()> {
        let token_hash = token_hash.to_string();
        self.run(move |conn| {
            conn.execute(
                "DELETE FROM sessions WHERE token_hash = ?1",
                params![token_hash],
            )?;
            Ok(())
        })
        .await
    }

    async fn save_oauth_state(&self, pending: &PendingLogin, expires_at: DateTime<Utc>) -> Result<()> {
        let pending = pending.clone();
        self.run(move |conn| {
            conn.execute(
                "DELETE FROM oauth_states WHERE expires_at <= ?1",
                params![Utc::now().timestamp()],
            )?;
            conn.execute(
                "INSERT INTO oauth_states (state, provider, secret, expires_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    pending.state,
                    pending.provider,
                    pending.secret,
                    expires_at.timestamp()
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn take_oauth_state(
        &self,
        state: &str,
        provider: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<PendingLogin>> {
        let (state, provider) = (state.to_string(), provider.to_string());
        self.run(move |conn| {
            let tx = conn.transaction()?;
            let secret: Option<Option<String>> = tx
                .query_row(
                    "SELECT secret FROM oauth_states
                     WHERE state = ?1 AND provider = ?2 AND expires_at > ?3",
                    params![state, provider, now.timestamp()],
                    |row| row.get(0),
                )
                .optional()?;
            tx.execute(
                "DELETE FROM oauth_states WHERE state = ?1 AND provider = ?2",
                params![state, provider],
            )?;
            tx.commit()?;

            Ok(secret.map(|secret| PendingLogin {
                state,
                provider,
                secret,
            }))
        })
        .await
    }
}
