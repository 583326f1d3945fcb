use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use tracing::error;

/// Request-error taxonomy for the relay endpoints.
///
/// Every variant renders as a flat `{"error": ...}` JSON object; internal
/// failures are logged server-side and never leak details to the caller.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),
    #[error("Invalid secret")]
    InvalidSecret,
    #[error("Rate limit exceeded")]
    RateLimited,
    #[error(transparent)]
    Store(#[from] sqlx::Error),
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Validation(message) => (StatusCode::BAD_REQUEST, message),
            Self::InvalidSecret => (StatusCode::FORBIDDEN, "Invalid secret".to_string()),
            Self::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Rate limit exceeded".to_string(),
            ),
            Self::Store(err) => {
                error!("Store operation failed: {err}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
