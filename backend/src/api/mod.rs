//! API module
//!
//! HTTP handlers of the local callback server: the OAuth authorization-code
//! flow, the SAML service provider endpoints and a health probe.

pub mod oauth;
pub mod saml;
pub mod utils;

use axum::Json;
use serde::Serialize;

/// Body of `GET /api/health`
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always "healthy" while the server answers
    pub status: String,
    /// Crate version
    pub version: String,
    /// Human-readable note
    pub message: String,
}

/// GET /api/health
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        message: "Callback server is healthy".to_string(),
    })
}
