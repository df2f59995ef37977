use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};

use crate::app::{AppContext, Result, RythmError};
use crate::domain::{UserPublicView, UserSelfView};
use crate::server::extract::AuthUser;
use crate::store::UserStore;

pub fn router() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/users", get(list))
        .route("/users/me", get(me).delete(delete_me))
        .route("/users/{user_id}", get(profile))
}

async fn list(State(ctx): State<Arc<AppContext>>) -> Result<Json<Vec<UserPublicView>>> {
    let users = ctx.store.list_users().await?;
    Ok(Json(users.iter().map(|u| u.public_view()).collect()))
}

async fn me(caller: AuthUser) -> Json<UserSelfView> {
    Json(caller.user.self_view())
}

async fn delete_me(State(ctx): State<Arc<AppContext>>, caller: AuthUser) -> Result<StatusCode> {
    ctx.auth.delete_account(&caller.user.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn profile(
    State(ctx): State<Arc<AppContext>>,
    Path(user_id): Path<String>,
) -> Result<Json<UserPublicView>> {
    let user = ctx
        .store
        .get_user(&user_id)
        .await?
        .ok_or(RythmError::UserNotFound(user_id))?;
    Ok(Json(user.public_view()))
}
