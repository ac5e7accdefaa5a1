//! Optional bearer-validation middleware in front of the bridge endpoint.
//!
//! Enabled only when `validate_auth_url` is configured. Reads
//! `X-Beeper-Access-Token`, calls out to the validator, and binds the
//! returned identifier into the tracing span before running the handler.

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::Response,
};
use serde::Deserialize;
use tracing::Span;

use crate::error::RelayError;

const TOKEN_HEADER: &str = "X-Beeper-Access-Token";

#[derive(Clone)]
pub struct AuthState {
    pub client: reqwest::Client,
    pub validate_auth_url: String,
}

#[derive(Deserialize)]
struct ValidateResponse {
    identifier: String,
}

pub async fn require_valid_token(
    State(state): State<AuthState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, RelayError> {
    let token = request
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(RelayError::Unauthorized)?;

    let resp = state
        .client
        .get(&state.validate_auth_url)
        .header(header::AUTHORIZATION, &token)
        .send()
        .await
        .map_err(|e| RelayError::Upstream(e.to_string()))?;

    let status = resp.status();
    if status.as_u16() >= 500 {
        return Err(RelayError::Internal(format!("auth validator returned {status}")));
    }
    if status != StatusCode::OK {
        return Err(RelayError::Unauthorized);
    }

    let body: ValidateResponse = resp
        .json()
        .await
        .map_err(|e| RelayError::Internal(format!("auth validator response: {e}")))?;

    Span::current().record("identifier", tracing::field::display(&body.identifier));

    Ok(next.run(request).await)
}
