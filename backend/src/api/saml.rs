//! SAML 2.0 service provider handlers

use crate::api::utils::{links, page, table};
use crate::error::AppError;
use crate::okta::saml::fetch_idp_metadata;
use crate::state::SharedState;
use axum::{
    extract::{Query, State},
    http::header,
    response::{Html, IntoResponse, Redirect, Response},
    Form,
};
use serde::Deserialize;

const PROFILE_PATH: &str = "/saml/profile";

/// POST body of the assertion consumer service
#[derive(Debug, Deserialize)]
pub struct AcsForm {
    /// Base64 encoded `<samlp:Response>`
    #[serde(rename = "SAMLResponse")]
    pub saml_response: Option<String>,
    /// Where to send the user afterwards
    #[serde(rename = "RelayState")]
    pub relay_state: Option<String>,
}

/// Query string of the single logout service
#[derive(Debug, Deserialize)]
pub struct SlsParams {
    /// Deflated, base64 encoded `<samlp:LogoutResponse>`
    #[serde(rename = "SAMLResponse")]
    pub saml_response: Option<String>,
}

/// Cache the IdP metadata if needed; the download runs without holding the lock
async fn ensure_idp_metadata(state: &SharedState) -> Result<(), AppError> {
    let (http, url) = {
        let state = state.read().await;
        if state.saml.idp_metadata().is_some() {
            return Ok(());
        }
        state.saml.metadata_source()
    };
    let metadata = fetch_idp_metadata(&http, &url).await?;
    state.write().await.saml.set_idp_metadata(metadata);
    Ok(())
}

/// GET /saml/login - Redirect to the IdP with an AuthnRequest
pub async fn login(State(state): State<SharedState>) -> Result<Redirect, AppError> {
    ensure_idp_metadata(&state).await?;
    let (request_id, url) = state.write().await.saml.auth_request_url(PROFILE_PATH)?;
    tracing::info!(request_id = %request_id, "Redirecting to IdP for SAML login");
    Ok(Redirect::to(&url))
}

/// Only same-site paths are accepted as RelayState targets
fn safe_relay_state(relay_state: Option<String>) -> String {
    match relay_state {
        Some(target) if target.starts_with('/') && !target.starts_with("//") => target,
        _ => "/".to_string(),
    }
}

/// POST /saml/acs - Validate the response and continue to the relay state
pub async fn acs(
    State(state): State<SharedState>,
    Form(form): Form<AcsForm>,
) -> Result<Redirect, AppError> {
    let saml_response = form
        .saml_response
        .filter(|r| !r.trim().is_empty())
        .ok_or_else(|| AppError::InvalidInput("No SAML response received".to_string()))?;

    ensure_idp_metadata(&state).await?;
    let attributes = state.write().await.saml.process_saml_response(&saml_response)?;
    tracing::info!(attribute_count = attributes.len(), "SAML login accepted");
    Ok(Redirect::to(&safe_relay_state(form.relay_state)))
}

/// GET /saml/profile - Attributes and session details of the stored assertion
pub async fn profile(State(state): State<SharedState>) -> Result<Response, AppError> {
    let session = state.read().await.saml.store().load_saml()?;
    let Some(session) = session.filter(|s| s.authenticated) else {
        return Ok(Redirect::to("/saml/login").into_response());
    };

    let attributes = table(
        ("Attribute", "Value"),
        session
            .attributes
            .iter()
            .map(|(name, values)| (name.as_str(), values.join(", "))),
    );
    let details = table(
        ("Property", "Value"),
        [
            ("name_id", session.name_id.clone()),
            ("name_id_format", session.name_id_format.clone().unwrap_or_default()),
            ("session_index", session.session_index.clone().unwrap_or_default()),
            ("issuer", session.issuer.clone().unwrap_or_default()),
            ("authenticated", session.authenticated.to_string()),
        ],
    );

    let body = format!(
        "<h2>User Information</h2>\n{}\n<h2>SAML Session Information</h2>\n{}\n{}",
        attributes,
        details,
        links(&[("/saml/logout", "Logout")]),
    );
    Ok(page("User Profile (SAML)", &body).into_response())
}

/// GET /saml/logout - Start single logout, or clear locally when that fails
pub async fn logout(State(state): State<SharedState>) -> Result<Response, AppError> {
    let url = match ensure_idp_metadata(&state).await {
        Ok(()) => state.write().await.saml.logout_url(),
        Err(e) => Err(e),
    };
    match url {
        Ok(url) => Ok(Redirect::to(&url).into_response()),
        Err(e) => {
            tracing::warn!(error = %e, "SAML logout request failed, clearing local session");
            state.read().await.saml.store().clear()?;
            Ok(logged_out_page().into_response())
        }
    }
}

/// GET /saml/sls - LogoutResponse from the IdP
pub async fn sls(
    State(state): State<SharedState>,
    Query(params): Query<SlsParams>,
) -> Result<Html<String>, AppError> {
    let saml_response = params
        .saml_response
        .ok_or_else(|| AppError::InvalidInput("No SAML logout response received".to_string()))?;
    let cleared = state
        .write()
        .await
        .saml
        .process_logout_response(&saml_response)?;
    if !cleared {
        return Err(AppError::Saml("IdP reported logout failure".to_string()));
    }
    Ok(logged_out_page())
}

/// GET /saml/metadata - SP metadata document
pub async fn metadata(State(state): State<SharedState>) -> impl IntoResponse {
    let xml = state.read().await.saml.sp_metadata_xml();
    ([(header::CONTENT_TYPE, "text/xml")], xml)
}

fn logged_out_page() -> Html<String> {
    page(
        "Logged Out",
        &format!(
            "<p>Your local session has been cleared.</p>\n{}",
            links(&[("/", "Return to Home")])
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_state_restricted_to_local_paths() {
        assert_eq!(safe_relay_state(Some("/saml/profile".into())), "/saml/profile");
        assert_eq!(safe_relay_state(Some("https://evil.example".into())), "/");
        assert_eq!(safe_relay_state(Some("//evil.example".into())), "/");
        assert_eq!(safe_relay_state(None), "/");
    }
}
