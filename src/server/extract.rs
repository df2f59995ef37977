use std::sync::Arc;

use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{header::AUTHORIZATION, request::Parts},
    Json,
};
use serde::de::DeserializeOwned;

use crate::app::{AppContext, RythmError};
use crate::auth::session::bearer_token;
use crate::domain::User;

fn token_from(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_string)
}

/// The caller behind a valid bearer session. Rejects with 401 otherwise.
pub struct AuthUser {
    pub user: User,
    pub token: String,
}

impl FromRequestParts<Arc<AppContext>> for AuthUser {
    type Rejection = RythmError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let token =
            token_from(parts).ok_or_else(|| RythmError::Unauthorized("unauthorized".to_string()))?;
        let user = ctx.auth.authenticate(&token).await?;
        Ok(Self { user, token })
    }
}

/// The caller if a valid session is presented, anonymous otherwise.
pub struct MaybeUser(pub Option<User>);

impl FromRequestParts<Arc<AppContext>> for MaybeUser {
    type Rejection = RythmError;

    async fn from_request_parts(
        parts: &mut Parts,
        ctx: &Arc<AppContext>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = token_from(parts) else {
            return Ok(Self(None));
        };

        match ctx.auth.authenticate(&token).await {
            Ok(user) => Ok(Self(Some(user))),
            Err(RythmError::Unauthorized(_)) => Ok(Self(None)),
            Err(e) => Err(e),
        }
    }
}

/// `Json` whose rejections are reported as validation errors.
pub struct ValidJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = RythmError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| RythmError::Validation(rejection.body_text()))?;
        Ok(Self(value))
    }
}
