//! Error type surfaced to callers of the HTTP API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::workbook::WorkbookError;

/// Errors that can occur while serving a dashboard update.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The repository cell did not hold an `owner/repo` identifier.
    #[error("Please provide a repo in the form 'owner/repo'.")]
    InvalidRepository,

    /// GitHub answered with a non-success status.
    #[error("Error contacting GitHub: {message}")]
    Upstream { status: StatusCode, message: String },

    /// No credential was presented, or the identity provider rejected it.
    #[error("Could not validate credentials")]
    Unauthorized,

    /// The caller authenticated but is not permitted to use the service.
    #[error("{0} is not allowed to access this service")]
    Forbidden(String),

    #[error(transparent)]
    Workbook(#[from] WorkbookError),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Builds an upstream error from a GitHub response status and its decoded body.
    ///
    /// Uses the body's `message` field when present, otherwise falls back to the status code.
    pub fn upstream(status: StatusCode, body: Option<&serde_json::Value>) -> Self {
        let message = body
            .and_then(|body| body.get("message"))
            .and_then(serde_json::Value::as_str)
            .filter(|message| !message.is_empty())
            .map_or_else(|| status.as_u16().to_string(), str::to_string);

        ApiError::Upstream { status, message }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidRepository => StatusCode::BAD_REQUEST,
            ApiError::Upstream { status, .. } => *status,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Workbook(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("Request failed: {:#}", self);
        }

        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_message_from_body() {
        let body = json!({ "message": "API rate limit exceeded", "documentation_url": "x" });
        let err = ApiError::upstream(StatusCode::FORBIDDEN, Some(&body));

        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(err.to_string(), "Error contacting GitHub: API rate limit exceeded");
    }

    #[test]
    fn test_upstream_message_falls_back_to_status() {
        let err = ApiError::upstream(StatusCode::BAD_GATEWAY, None);
        assert_eq!(err.to_string(), "Error contacting GitHub: 502");

        let body = json!({ "errors": [] });
        let err = ApiError::upstream(StatusCode::NOT_FOUND, Some(&body));
        assert_eq!(err.to_string(), "Error contacting GitHub: 404");
    }

    #[test]
    fn test_invalid_repository_is_client_error() {
        assert_eq!(
            ApiError::InvalidRepository.status_code(),
            StatusCode::BAD_REQUEST
        );
    }
}
