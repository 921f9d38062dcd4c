//! Error types for the control API.
//!
//! [`ObserverError`] is converted into a JSON error response via its
//! [`IntoResponse`](axum::response::IntoResponse) implementation. Runner
//! errors are mapped by cause: bad input is the caller's fault (400), an
//! unreachable game server is an upstream failure (502).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lanepilot_runner::RunnerError;

/// Errors that can occur in the control API layer.
#[derive(Debug, thiserror::Error)]
pub enum ObserverError {
    /// The request was well-formed but rejected by validation.
    #[error("invalid request: {0}")]
    BadRequest(String),

    /// The game server or chat backend could not be reached.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// A serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<RunnerError> for ObserverError {
    fn from(err: RunnerError) -> Self {
        match err {
            RunnerError::Config(msg) => Self::BadRequest(msg),
            RunnerError::Transport(_) | RunnerError::Policy(_) | RunnerError::Timeout { .. } => {
                Self::Upstream(err.to_string())
            }
            RunnerError::Serde(e) => Self::Serialization(e),
            RunnerError::Decode(_) | RunnerError::Template(_) | RunnerError::Settings(_) => {
                Self::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for ObserverError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Upstream(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            Self::Serialization(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("JSON error: {e}")),
            Self::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
        });

        (status, axum::Json(body)).into_response()
    }
}
