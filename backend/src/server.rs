//! Local callback web server
//!
//! Hosts the OAuth redirect URI and the SAML assertion consumer service so a
//! browser login can hand its result back to this process.

use crate::api;
use crate::config::Config;
use crate::state::{AppState, SharedState};
use axum::{
    extract::Request,
    middleware::Next,
    response::Response,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::time::Instant;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

/// Request ID middleware - adds unique ID to each request for tracing
async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let uri = request.uri().path().to_string();
    let start = Instant::now();

    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %method,
        path = %uri,
    );

    let response = next.run(request).instrument(span).await;

    info!(
        request_id = %request_id,
        method = %method,
        path = %uri,
        status = %response.status().as_u16(),
        duration_ms = start.elapsed().as_millis(),
        "Request completed"
    );

    response
}

/// Build the router with every OAuth, SAML and health route
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(api::oauth::index))
        .route("/api/health", get(api::health_check))
        // OAuth 2.0 / OIDC
        .route("/login", get(api::oauth::login))
        .route("/authorization-code/callback", get(api::oauth::callback))
        .route("/profile", get(api::oauth::profile))
        .route("/refresh", get(api::oauth::refresh))
        .route("/revoke", get(api::oauth::revoke))
        // SAML 2.0
        .route("/saml/login", get(api::saml::login))
        .route("/saml/acs", post(api::saml::acs))
        .route("/saml/profile", get(api::saml::profile))
        .route("/saml/logout", get(api::saml::logout))
        .route("/saml/sls", get(api::saml::sls))
        .route("/saml/metadata", get(api::saml::metadata))
        // Middleware (order matters - request_id should be first)
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Run the callback server until Ctrl+C or SIGTERM
///
/// # Errors
/// * Invalid `HOST`/`PORT`, a port already in use, or a state setup failure
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;

    let state = AppState::new(config)?.into_shared();
    let app = build_router(state);

    info!("Callback server running on http://{}", addr);
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Handle graceful shutdown signals (Ctrl+C, SIGTERM)
pub(crate) async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down gracefully...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down gracefully...");
        },
    }
}
