use std::path::Path;
use std::sync::Arc;

use serde::Deserialize;

use crate::app::{AppContext, Result, RythmError};
use crate::auth::password::hash_password_off_thread;
use crate::auth::service::normalize_email;
use crate::domain::{NewUser, User};
use crate::server::dto::TodoBody;
use crate::store::{ThumbAudit, TodoStore, UserStore};

/// Accepted layouts of an import file.
#[derive(Deserialize)]
#[serde(untagged)]
enum ImportFile {
    List(Vec<TodoBody>),
    Wrapped { todos: Vec<TodoBody> },
}

pub async fn serve(ctx: Arc<AppContext>, bind: &str) -> Result<()> {
    crate::server::serve(ctx, bind).await
}

pub async fn add_user(
    ctx: &AppContext,
    email: &str,
    username: &str,
    password: &str,
    role: &str,
) -> Result<User> {
    if password.is_empty() {
        return Err(RythmError::Validation("Password cannot be blank".into()));
    }

    let mut new_user = NewUser::new(
        Some(normalize_email(email)),
        Some(username.trim().to_string()),
    );
    new_user.role = role.to_string();
    new_user.password = Some(
        hash_password_off_thread(password.to_string(), ctx.config.auth.password_rounds).await?,
    );

    let user = ctx.store.create_user(&new_user).await?;
    println!("Created user {} ({})", username, user.user_id);
    Ok(user)
}

pub async fn import_todos(ctx: &AppContext, owner: &str, path: &Path) -> Result<usize> {
    let owner = ctx
        .store
        .get_user(owner)
        .await?
        .ok_or_else(|| RythmError::UserNotFound(owner.to_string()))?;

    let content = std::fs::read_to_string(path)?;
    let bodies = match serde_json::from_str::<ImportFile>(&content)? {
        ImportFile::List(todos) | ImportFile::Wrapped { todos } => todos,
    };

    if bodies.is_empty() {
        println!("No todos to import");
        return Ok(0);
    }

    let drafts = bodies
        .into_iter()
        .enumerate()
        .map(|(i, body)| {
            body.validate()
                .map_err(|e| RythmError::Validation(format!("entry {i}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let todos = ctx.todos.insert_many(&owner, drafts).await?;
    println!("Imported {} todos for {}", todos.len(), owner.handle());
    Ok(todos.len())
}

pub async fn audit(ctx: &AppContext) -> Result<ThumbAudit> {
    let report = ctx.store.thumb_audit().await?;

    if report.is_clean() {
        println!("Thumb counters match user reactions");
        return Ok(report);
    }

    for drift in &report.drifted {
        println!(
            "{}: thumbs_up {} (liked by {}), thumbs_down {} (not liked by {})",
            drift.todo_id, drift.thumbs_up, drift.liked_by, drift.thumbs_down, drift.not_liked_by
        );
    }
    for double in &report.double_reactions {
        println!(
            "{} both likes and dislikes {}",
            double.user_id, double.todo_id
        );
    }
    println!(
        "{} drifted todos, {} double reactions",
        report.drifted.len(),
        report.double_reactions.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::config::Config;
    use crate::domain::{Reaction, TodoQuery};
    use crate::store::ReactionStore;

    fn context() -> AppContext {
        let mut config = Config::default();
        config.auth.password_rounds = 1_000;
        AppContext::in_memory(config).unwrap()
    }

    fn write_json(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    const TODO_JSON: &str = r#"{"title": "Camp", "description": "Tent and stove",
        "category": "outdoors", "private": false,
        "list": [{"item_name": "tent", "status": "todo"}]}"#;

    #[tokio::test]
    async fn test_add_user_can_log_in() {
        let ctx = context();
        let user = add_user(&ctx, "Ops@Example.com", "ops", "pw", "admin")
            .await
            .unwrap();
        assert_eq!(user.role, "admin");
        assert!(user.active);

        let session = ctx.auth.login("ops@example.com", "pw").await.unwrap();
        assert_eq!(session.user.user_id, user.user_id);

        let dup = add_user(&ctx, "ops@example.com", "ops2", "pw", "user")
            .await
            .unwrap_err();
        assert_eq!(dup.status_code(), 409);
    }

    #[tokio::test]
    async fn test_import_both_layouts() {
        let ctx = context();
        let owner = add_user(&ctx, "o@example.com", "owner", "pw", "user")
            .await
            .unwrap();

        let list = write_json(&format!("[{TODO_JSON}, {TODO_JSON}]"));
        assert_eq!(import_todos(&ctx, &owner.user_id, list.path()).await.unwrap(), 2);

        let wrapped = write_json(&format!(r#"{{"todos": [{TODO_JSON}]}}"#));
        assert_eq!(
            import_todos(&ctx, &owner.user_id, wrapped.path()).await.unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_import_rejects_invalid_entry_and_unknown_owner() {
        let ctx = context();
        let owner = add_user(&ctx, "o@example.com", "owner", "pw", "user")
            .await
            .unwrap();

        let bad = write_json(&format!(r#"[{TODO_JSON}, {{"title": "half"}}]"#));
        let err = import_todos(&ctx, &owner.user_id, bad.path())
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("entry 1: "));

        let good = write_json(&format!("[{TODO_JSON}]"));
        let err = import_todos(&ctx, "rythm-ghost", good.path())
            .await
            .unwrap_err();
        assert!(matches!(err, RythmError::UserNotFound(_)));
    }

    #[tokio::test]
    async fn test_audit_reports_drift() {
        let ctx = context();
        let owner = add_user(&ctx, "o@example.com", "owner", "pw", "user")
            .await
            .unwrap();
        let file = write_json(&format!("[{TODO_JSON}]"));
        import_todos(&ctx, &owner.user_id, file.path()).await.unwrap();

        assert!(audit(&ctx).await.unwrap().is_clean());

        let query = TodoQuery {
            user_id: Some(owner.user_id.clone()),
            ..Default::default()
        };
        let todo_id = ctx.store.query_todos(&query).await.unwrap()[0].todo_id.clone();
        ctx.store
            .adjust_thumbs(&todo_id, Reaction::Up, 1)
            .await
            .unwrap();

        let report = audit(&ctx).await.unwrap();
        assert_eq!(report.drifted.len(), 1);
        assert_eq!(report.drifted[0].thumbs_up, 1);
        assert_eq!(report.drifted[0].liked_by, 0);
    }
}
