//! Okta authentication clients
//!
//! OAuth 2.0 / OIDC, SAML 2.0, the API-token management API and a typed
//! directory client built on it.

pub mod api;
pub mod models;
pub mod oauth;
pub mod saml;
pub mod saml_xml;
pub mod sdk;
pub mod xml_signature;

pub use api::OktaApiClient;
pub use oauth::{OktaOAuthClient, PkcePair};
pub use saml::{fetch_idp_metadata, IdpMetadata, SamlServiceProvider};
pub use sdk::OktaClient;
