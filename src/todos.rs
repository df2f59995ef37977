//! Todo lifecycle on behalf of an authenticated caller.
//!
//! Every mutation checks existence before ownership, so a caller probing
//! someone else's missing todo gets 404 rather than 401. A private todo
//! counts as missing for everyone but its owner.

use std::sync::Arc;

use tracing::{debug, info};

use crate::app::{Result, RythmError};
use crate::domain::{Comment, NewTodo, Todo, TodoEdit, TodoQuery, User};
use crate::store::Store;

pub struct TodoService {
    store: Arc<dyn Store>,
}

impl TodoService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn insert(&self, caller: &User, draft: NewTodo) -> Result<Todo> {
        let todo = self.build(caller, draft).await?;
        self.store.insert_todo(&todo).await?;
        info!(todo_id = %todo.todo_id, user_id = %caller.user_id, "Inserted todo");
        Ok(todo)
    }

    /// Insert all drafts or none of them.
    pub async fn insert_many(&self, caller: &User, drafts: Vec<NewTodo>) -> Result<Vec<Todo>> {
        let mut todos = Vec::with_capacity(drafts.len());
        for draft in drafts {
            todos.push(self.build(caller, draft).await?);
        }

        let count = self.store.insert_todos(&todos).await?;
        info!(count, user_id = %caller.user_id, "Inserted todos");
        Ok(todos)
    }

    pub async fn edit(&self, caller: &User, todo_id: &str, edit: &TodoEdit) -> Result<Todo> {
        self.owned(caller, todo_id).await?;
        if edit.is_empty() {
            return Err(RythmError::Validation(
                "No editable fields present with request".to_string(),
            ));
        }

        self.store.update_todo(todo_id, edit).await?;
        self.reload(todo_id).await
    }

    pub async fn delete(&self, caller: &User, todo_id: &str) -> Result<()> {
        self.owned(caller, todo_id).await?;
        self.store.delete_todo(todo_id).await?;
        info!(todo_id, "Deleted todo");
        Ok(())
    }

    /// Append a comment. Owners may comment on their own todos.
    pub async fn comment(&self, caller: &User, todo_id: &str, text: &str) -> Result<Todo> {
        self.visible(caller, todo_id).await?;
        self.store
            .append_comment(todo_id, &Comment::new(&caller.user_id, text))
            .await?;
        debug!(todo_id, user_id = %caller.user_id, "Appended comment");
        self.reload(todo_id).await
    }

    /// Run a query, hiding private todos from everyone but their owner.
    pub async fn query(&self, viewer: Option<&User>, query: &TodoQuery) -> Result<Vec<Todo>> {
        let viewer_id = viewer.map(|u| u.user_id.as_str());
        let todos: Vec<Todo> = self
            .store
            .query_todos(query)
            .await?
            .into_iter()
            .filter(|todo| todo.visible_to(viewer_id))
            .collect();
        debug!(search = query.is_search(), count = todos.len(), "Ran todo query");
        Ok(todos)
    }

    async fn build(&self, caller: &User, mut draft: NewTodo) -> Result<Todo> {
        let master_id = draft.master_id.take();
        if let Some(master_id) = &master_id {
            self.visible(caller, master_id).await?;
        }
        Ok(Todo::new(&caller.user_id, caller.handle(), draft, master_id))
    }

    async fn existing(&self, todo_id: &str) -> Result<Todo> {
        self.store
            .get_todo(todo_id)
            .await?
            .ok_or_else(|| RythmError::TodoNotFound(todo_id.to_string()))
    }

    async fn visible(&self, caller: &User, todo_id: &str) -> Result<Todo> {
        let todo = self.existing(todo_id).await?;
        if !todo.visible_to(Some(&caller.user_id)) {
            return Err(RythmError::TodoNotFound(todo_id.to_string()));
        }
        Ok(todo)
    }

    async fn owned(&self, caller: &User, todo_id: &str) -> Result<Todo> {
        let todo = self.existing(todo_id).await?;
        if !todo.is_owned_by(&caller.user_id) {
            return Err(RythmError::NotOwner);
        }
        Ok(todo)
    }

    async fn reload(&self, todo_id: &str) -> Result<Todo> {
        self.existing(todo_id).await
    }
}
