//! Error types for the registration relay.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Errors surfaced across the registry, session, and HTTP layers.
///
/// Session-local protocol faults (malformed frames, read errors) never reach
/// this type — they terminate the session in place. `RelayError` covers only
/// the paths that must map to an HTTP response.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Register request carried a code/secret pair that didn't verify.
    #[error("invalid token")]
    InvalidToken,

    /// Bridge call missing or malformed `Authorization: Bearer <code>`.
    #[error("missing bearer token")]
    MissingBearer,

    /// `X-Beeper-Access-Token` rejected by the auth validator, or absent.
    #[error("unauthorized")]
    Unauthorized,

    /// No provider registered under the presented code.
    #[error("unknown provider code")]
    NotFound,

    /// `execute_command` did not receive a response within the deadline.
    #[error("request timed out")]
    Timeout,

    /// The auth validator (or upstream) returned a 5xx or was unreachable.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Anything else — mapped to 500, logged with detail server-side only.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::InvalidToken => StatusCode::BAD_REQUEST,
            Self::MissingBearer => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Timeout => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
