use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};

use crate::app::RythmError;

/// Error body sent to clients.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub msg: String,
    pub code: u16,
}

impl IntoResponse for RythmError {
    fn into_response(self) -> Response {
        let code = self.status_code();
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if code == 400 || code >= 500 {
            error!(%status, "Request failed: {self}");
        } else {
            warn!(%status, "Request rejected: {self}");
        }

        let body = ErrorBody {
            msg: self.to_string(),
            code,
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;

    use super::*;

    async fn render(err: RythmError) -> (StatusCode, serde_json::Value) {
        let resp = err.into_response();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_error_body_shape() {
        let (status, body) = render(RythmError::SelfReactionForbidden).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["code"], 401);
        assert_eq!(body["msg"], "Client cannot own this todo for this operation");
    }

    #[tokio::test]
    async fn test_store_failure_is_bad_request() {
        let (status, body) =
            render(RythmError::StoreUnavailable(rusqlite::Error::InvalidQuery)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], 400);
    }
}
