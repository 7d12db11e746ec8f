//! OAuth 2.0 / OIDC callback server handlers
//!
//! Authorization-code flow with PKCE. The verifier for each redirect is kept
//! in server memory keyed by `state` until the callback consumes it.

use crate::api::utils::{links, page, pre};
use crate::error::AppError;
use crate::okta::OktaOAuthClient;
use crate::state::SharedState;
use axum::{
    extract::{Query, State},
    response::{Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;

/// Query string Okta sends to the redirect URI
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    /// Authorization code
    pub code: Option<String>,
    /// State echoed from the authorization request
    pub state: Option<String>,
    /// Error code when the user or server refused
    pub error: Option<String>,
    /// Human-readable error
    pub error_description: Option<String>,
}

/// GET / - Landing page
pub async fn index() -> Html<String> {
    page(
        "Okta Authentication Example",
        &links(&[
            ("/login", "Login with Okta (OAuth 2.0)"),
            ("/saml/login", "Login with Okta (SAML)"),
            ("/saml/metadata", "SAML service provider metadata"),
        ]),
    )
}

/// GET /login - Redirect to Okta with a fresh PKCE challenge
pub async fn login(State(state): State<SharedState>) -> Redirect {
    let pkce = OktaOAuthClient::generate_pkce_pair();
    let mut state = state.write().await;
    let (url, csrf_state) = state.oauth.authorization_url(None, Some(&pkce.challenge));
    state.begin_login(csrf_state, pkce.verifier);

    tracing::info!(pending = state.pending_login_count(), "Redirecting to Okta authorize endpoint");
    Redirect::to(&url)
}

/// GET /authorization-code/callback - Exchange the code and show the profile
pub async fn callback(
    State(state): State<SharedState>,
    Query(params): Query<CallbackParams>,
) -> Result<Redirect, AppError> {
    if let Some(error) = params.error {
        let description = params.error_description.unwrap_or_default();
        tracing::warn!(error = %error, "Authorization server returned an error");
        return Err(AppError::OAuth(format!("{} {}", error, description).trim().to_string()));
    }

    let (pending, oauth) = {
        let mut state = state.write().await;
        let pending = params
            .state
            .as_deref()
            .and_then(|s| state.take_login(s))
            .ok_or(AppError::StateMismatch)?;
        (pending, state.oauth.clone())
    };

    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::InvalidInput("No authorization code received.".to_string()))?;

    oauth
        .exchange_code_for_tokens(&code, Some(&pending.code_verifier))
        .await?;
    tracing::info!("Authorization code exchanged for tokens");
    Ok(Redirect::to("/profile"))
}

/// GET /profile - Claims from the userinfo endpoint and the stored tokens
pub async fn profile(State(state): State<SharedState>) -> Result<Response, AppError> {
    let oauth = state.read().await.oauth.clone();
    let userinfo = match oauth.get_userinfo().await {
        Ok(info) => info,
        Err(AppError::NotAuthenticated(_)) => return Ok(Redirect::to("/login").into_response()),
        Err(e) => return Err(e),
    };
    let record = oauth.store().load_oauth()?;
    let access_token = record
        .as_ref()
        .map(|r| r.access_token.as_str())
        .filter(|t| !t.is_empty())
        .unwrap_or("Not available");
    let id_token = record
        .as_ref()
        .and_then(|r| r.id_token.as_deref())
        .unwrap_or("Not available");

    let body = format!(
        "<h2>User Information</h2>\n{}\n<h2>Tokens</h2>\n<h3>Access Token</h3>\n{}\n<h3>ID Token</h3>\n{}\n{}",
        pre(&serde_json::to_string_pretty(&userinfo)?),
        pre(access_token),
        pre(id_token),
        links(&[("/refresh", "Refresh Tokens"), ("/revoke", "Logout (Revoke Tokens)")]),
    );
    Ok(page("User Profile", &body).into_response())
}

/// GET /refresh - Use the refresh token, then show the profile again
pub async fn refresh(State(state): State<SharedState>) -> Result<Redirect, AppError> {
    let oauth = state.read().await.oauth.clone();
    oauth.refresh_tokens().await?;
    Ok(Redirect::to("/profile"))
}

/// GET /revoke - Revoke the stored tokens and clear the token file
pub async fn revoke(State(state): State<SharedState>) -> Result<Html<String>, AppError> {
    let oauth = state.read().await.oauth.clone();
    oauth.revoke_tokens().await?;
    Ok(page(
        "Logged Out",
        &format!("<p>Your tokens have been revoked.</p>\n{}", links(&[("/", "Return to Home")])),
    ))
}
