use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Redirect,
    routing::{get, post},
    Json, Router,
};

use crate::app::{AppContext, Result, RythmError};
use crate::domain::UserSelfView;
use crate::server::dto::{
    CallbackQuery, EmailQuery, ExistsResponse, LoginBody, RegisterBody, SessionResponse,
    UsernameQuery,
};
use crate::server::extract::{AuthUser, ValidJson};

pub fn router() -> Router<Arc<AppContext>> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/auth/activate/{token}", get(activate))
        .route("/auth/email-exists", get(email_exists))
        .route("/auth/username-exists", get(username_exists))
        .route("/auth/{provider}", get(social_start))
        .route("/auth/{provider}/callback", get(social_callback))
}

async fn register(
    State(ctx): State<Arc<AppContext>>,
    ValidJson(body): ValidJson<RegisterBody>,
) -> Result<(StatusCode, Json<UserSelfView>)> {
    let account = body.validate()?;
    let user = ctx.auth.register(account).await?;
    Ok((StatusCode::CREATED, Json(user.self_view())))
}

async fn login(
    State(ctx): State<Arc<AppContext>>,
    ValidJson(body): ValidJson<LoginBody>,
) -> Result<Json<SessionResponse>> {
    let (email, password) = body.validate()?;
    let session = ctx.auth.login(&email, &password).await?;
    Ok(Json(session.into()))
}

async fn logout(State(ctx): State<Arc<AppContext>>, caller: AuthUser) -> Result<StatusCode> {
    ctx.auth.logout(&caller.token).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn activate(
    State(ctx): State<Arc<AppContext>>,
    Path(token): Path<String>,
) -> Result<Json<SessionResponse>> {
    let session = ctx.auth.activate(&token).await?;
    Ok(Json(session.into()))
}

async fn email_exists(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<EmailQuery>,
) -> Result<Json<ExistsResponse>> {
    let email = query
        .email
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| RythmError::Validation("email is empty".to_string()))?;
    let exists = ctx.auth.email_exists(&email).await?;
    Ok(Json(ExistsResponse { exists }))
}

async fn username_exists(
    State(ctx): State<Arc<AppContext>>,
    Query(query): Query<UsernameQuery>,
) -> Result<Json<ExistsResponse>> {
    let username = query
        .username
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| RythmError::Validation("username is empty".to_string()))?;
    let exists = ctx.auth.username_exists(&username).await?;
    Ok(Json(ExistsResponse { exists }))
}

async fn social_start(
    State(ctx): State<Arc<AppContext>>,
    Path(provider): Path<String>,
) -> Result<Redirect> {
    let url = ctx.auth.begin_social_login(&provider).await?;
    Ok(Redirect::to(&url))
}

async fn social_callback(
    State(ctx): State<Arc<AppContext>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Json<SessionResponse>> {
    let (code, state) = query.grant(&provider)?;

    let session = ctx
        .auth
        .finish_social_login(&provider, &code, &state)
        .await?;
    Ok(Json(session.into()))
}
