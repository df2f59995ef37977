use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};

use crate::app::{AppContext, Result};
use crate::domain::{Todo, TodoQuery};
use crate::server::dto::{CommentBody, EditBody, InsertManyBody, ThumbsBody, TodoBody};
use crate::server::extract::{AuthUser, MaybeUser, ValidJson};

pub fn router() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/todo/insert", post(insert))
        .route("/todo/insertmany", post(insert_many))
        .route("/todo/query", get(query))
        .route("/todo/edit", put(edit))
        .route("/todo/remove/{todo_id}", delete(remove))
        .route("/todo/thumbs", put(thumbs))
        .route("/todo/comment", post(comment))
}

async fn insert(
    State(ctx): State<Arc<AppContext>>,
    caller: AuthUser,
    ValidJson(body): ValidJson<TodoBody>,
) -> Result<Json<Todo>> {
    let draft = body.validate()?;
    Ok(Json(ctx.todos.insert(&caller.user, draft).await?))
}

async fn insert_many(
    State(ctx): State<Arc<AppContext>>,
    caller: AuthUser,
    ValidJson(body): ValidJson<InsertManyBody>,
) -> Result<Json<Vec<Todo>>> {
    let drafts = body.validate()?;
    Ok(Json(ctx.todos.insert_many(&caller.user, drafts).await?))
}

async fn query(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<HashMap<String, String>>,
    MaybeUser(viewer): MaybeUser,
) -> Result<Json<Vec<Todo>>> {
    let query = TodoQuery::from_params(&params)?;
    Ok(Json(ctx.todos.query(viewer.as_ref(), &query).await?))
}

async fn edit(
    State(ctx): State<Arc<AppContext>>,
    caller: AuthUser,
    ValidJson(body): ValidJson<EditBody>,
) -> Result<Json<Todo>> {
    let (todo_id, edit) = body.validate()?;
    Ok(Json(ctx.todos.edit(&caller.user, &todo_id, &edit).await?))
}

async fn remove(
    State(ctx): State<Arc<AppContext>>,
    caller: AuthUser,
    Path(todo_id): Path<String>,
) -> Result<StatusCode> {
    ctx.todos.delete(&caller.user, &todo_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn thumbs(
    State(ctx): State<Arc<AppContext>>,
    caller: AuthUser,
    ValidJson(body): ValidJson<ThumbsBody>,
) -> Result<Json<Todo>> {
    let (todo_id, reaction) = body.validate()?;
    let todo = ctx
        .engine
        .apply_reaction(&caller.user.user_id, &todo_id, reaction)
        .await?;
    Ok(Json(todo))
}

async fn comment(
    State(ctx): State<Arc<AppContext>>,
    caller: AuthUser,
    ValidJson(body): ValidJson<CommentBody>,
) -> Result<Json<Todo>> {
    let (todo_id, text) = body.validate()?;
    Ok(Json(ctx.todos.comment(&caller.user, &todo_id, &text).await?))
}
