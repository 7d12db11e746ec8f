// Callback server state
// Holds the OAuth client, the SAML service provider and pending logins

use crate::config::Config;
use crate::error::AppError;
use crate::okta::{OktaOAuthClient, SamlServiceProvider};
use crate::state::token_store::TokenStore;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Pending logins older than this are dropped
pub const PENDING_LOGIN_TTL_SECS: i64 = 600;

/// A login that was redirected to Okta and has not come back yet
#[derive(Debug, Clone)]
pub struct PendingLogin {
    /// PKCE verifier matching the challenge sent with the redirect
    pub code_verifier: String,
    /// When the redirect was issued (Unix timestamp)
    pub created_at: i64,
}

/// Shared server state
#[derive(Debug)]
pub struct AppState {
    /// Loaded configuration
    pub config: Config,
    /// OAuth/OIDC client
    pub oauth: OktaOAuthClient,
    /// SAML service provider (caches IdP metadata, tracks outstanding requests)
    pub saml: SamlServiceProvider,
    /// state -> pending login
    pending_logins: HashMap<String, PendingLogin>,
}

/// State handle passed to the axum handlers
pub type SharedState = Arc<RwLock<AppState>>;

impl AppState {
    /// Build the server state from configuration
    pub fn new(config: Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.storage.http_timeout_secs))
            .build()?;
        let store = TokenStore::new(config.storage.token_file.clone());
        let oauth = OktaOAuthClient::new(&config.okta, store.clone(), http.clone())?;
        let saml = SamlServiceProvider::new(config.saml.clone(), store, http);

        Ok(Self {
            config,
            oauth,
            saml,
            pending_logins: HashMap::new(),
        })
    }

    /// Assemble state from prebuilt parts (used by tests)
    pub fn from_parts(config: Config, oauth: OktaOAuthClient, saml: SamlServiceProvider) -> Self {
        Self {
            config,
            oauth,
            saml,
            pending_logins: HashMap::new(),
        }
    }

    /// Wrap into the handle the router expects
    pub fn into_shared(self) -> SharedState {
        Arc::new(RwLock::new(self))
    }

    /// Remember the verifier for a login redirect
    pub fn begin_login(&mut self, state: String, code_verifier: String) {
        let now = Utc::now().timestamp();
        self.prune_pending(now);
        self.pending_logins.insert(
            state,
            PendingLogin {
                code_verifier,
                created_at: now,
            },
        );
    }

    /// Take the pending login for `state`, if it is known and not stale
    pub fn take_login(&mut self, state: &str) -> Option<PendingLogin> {
        self.prune_pending(Utc::now().timestamp());
        self.pending_logins.remove(state)
    }

    /// Number of logins awaiting their callback
    pub fn pending_login_count(&self) -> usize {
        self.pending_logins.len()
    }

    fn prune_pending(&mut self, now: i64) {
        self.pending_logins
            .retain(|_, login| now - login.created_at < PENDING_LOGIN_TTL_SECS);
    }
}
