//! Error types and error handling for the application
//!
//! This module defines custom error types that can be converted to HTTP responses.
//! All errors implement `IntoResponse` to provide consistent error formatting.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application-level error types
///
/// Errors are surfaced as-is from the underlying HTTP, OAuth, SAML and
/// signing calls; nothing here retries.
#[derive(Error, Debug)]
pub enum AppError {
    /// Required configuration is missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Caller supplied an invalid value
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The OAuth token endpoint rejected an exchange
    #[error("OAuth error: {0}")]
    OAuth(String),

    /// No refresh token is stored, so the session cannot be renewed
    #[error("No refresh token available")]
    NoRefreshToken,

    /// No usable token or SAML session is stored
    #[error("Not authenticated: {0}")]
    NotAuthenticated(String),

    /// The `state` returned to the callback does not match a pending login
    #[error("State mismatch. Possible CSRF attack.")]
    StateMismatch,

    /// Transport-level HTTP failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A remote API answered with an error status
    #[error("API returned error status {status}: {body}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Raw response body
        body: String,
    },

    /// A response body could not be parsed
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// SAML message could not be built, decoded or accepted
    #[error("SAML error: {0}")]
    Saml(String),

    /// AWS request signing failed
    #[error("Signing error: {0}")]
    Signing(String),

    /// Error occurred reading or writing the token file
    #[error("Token storage error: {0}")]
    Storage(#[from] crate::state::StoreError),

    /// Internal error (catch-all for unexpected errors)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// HTTP status carried by an [`AppError::Api`], if any
    pub fn api_status(&self) -> Option<u16> {
        match self {
            AppError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Parse(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match &self {
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::OAuth(_) => StatusCode::BAD_REQUEST,
            AppError::NoRefreshToken => StatusCode::BAD_REQUEST,
            AppError::NotAuthenticated(_) => StatusCode::UNAUTHORIZED,
            AppError::StateMismatch => StatusCode::BAD_REQUEST,
            AppError::Http(_) => StatusCode::BAD_GATEWAY,
            AppError::Api { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            AppError::Parse(_) => StatusCode::BAD_GATEWAY,
            AppError::Saml(_) => StatusCode::BAD_REQUEST,
            AppError::Signing(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
