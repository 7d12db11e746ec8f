//! Okta callback server
//!
//! Serves the OAuth redirect URI and the SAML endpoints on `HOST:PORT`.

use okta_q_backend::config::Config;
use okta_q_backend::server;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    info!(
        org_url = %config.okta.org_url,
        redirect_uri = %config.okta.redirect_uri,
        token_file = %config.storage.token_file.display(),
        "Configuration loaded"
    );
    for field in config.placeholder_fields() {
        tracing::warn!(field, "Configuration still holds a placeholder value");
    }

    server::serve(config).await
}
