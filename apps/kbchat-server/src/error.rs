use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use kbchat_pipeline::TEMPORARY_ISSUE;

#[derive(Debug)]
pub enum AppError {
    /// The caller sent something unusable; the message is returned verbatim.
    BadRequest(String),
    /// Anything else. Details stay in the log.
    Internal(String),
}

impl From<kbchat_core::error::Error> for AppError {
    fn from(err: kbchat_core::error::Error) -> Self {
        if err.is_client_error() {
            let message = match err {
                kbchat_core::error::Error::Validation(msg) => msg,
                other => other.to_string(),
            };
            Self::BadRequest(message)
        } else {
            Self::Internal(err.to_string())
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(error) => (StatusCode::BAD_REQUEST, Json(json!({ "error": error }))).into_response(),
            Self::Internal(detail) => {
                tracing::error!(%detail, "chat request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "text": TEMPORARY_ISSUE, "refused": true, "error": "Internal server error" })),
                )
                    .into_response()
            }
        }
    }
}
