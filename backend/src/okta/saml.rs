//! SAML 2.0 service provider for an Okta IdP
//!
//! Requests go out over the HTTP-Redirect binding, responses come back over
//! HTTP-POST (login) or HTTP-Redirect (logout). A login response is only
//! accepted when its assertion is signed with a certificate from the IdP
//! metadata.

use crate::config::SamlConfig;
use crate::error::AppError;
use crate::okta::saml_xml::{
    authn_request_xml, logout_request_xml, sp_metadata_xml, AuthnRequestParams,
    LogoutRequestParams, XmlElement, BINDING_HTTP_POST, BINDING_HTTP_REDIRECT,
};
use crate::okta::xml_signature::verify_response;
use crate::state::{SamlSession, TokenStore};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, SecondsFormat, Utc};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::collections::{BTreeMap, HashSet};
use std::io::{Read, Write};
use url::Url;
use uuid::Uuid;

const STATUS_SUCCESS: &str = "urn:oasis:names:tc:SAML:2.0:status:Success";
const CLOCK_SKEW_SECS: i64 = 60;

/// Endpoints read from the IdP metadata document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdpMetadata {
    /// IdP entity ID
    pub entity_id: String,
    /// Single sign-on service URL
    pub sso_url: String,
    /// Binding of `sso_url`
    pub sso_binding: String,
    /// Single logout service URL, if the IdP publishes one
    pub slo_url: Option<String>,
    /// Base64 DER certificates from the signing KeyDescriptors
    pub signing_certificates: Vec<String>,
}

impl IdpMetadata {
    /// Read the IdP entity ID and endpoints from an EntityDescriptor
    ///
    /// The HTTP-Redirect SSO endpoint is preferred, HTTP-POST is accepted.
    pub fn parse(xml: &str) -> Result<Self, AppError> {
        let root = XmlElement::parse(xml)?;
        let descriptor = if root.name == "EntityDescriptor" {
            &root
        } else {
            root.find("EntityDescriptor")
                .ok_or_else(|| AppError::Saml("IdP metadata has no EntityDescriptor".into()))?
        };

        let entity_id = descriptor
            .attr("entityID")
            .ok_or_else(|| AppError::Saml("IdP metadata has no entityID".into()))?
            .to_string();

        let idp = descriptor
            .child("IDPSSODescriptor")
            .ok_or_else(|| AppError::Saml("IdP metadata has no IDPSSODescriptor".into()))?;

        let pick = |element: &str| -> Option<(String, String)> {
            let services: Vec<&XmlElement> = idp.children_named(element).collect();
            [BINDING_HTTP_REDIRECT, BINDING_HTTP_POST]
                .iter()
                .find_map(|binding| {
                    services
                        .iter()
                        .find(|s| s.attr("Binding") == Some(*binding))
                        .and_then(|s| s.attr("Location"))
                        .map(|loc| (loc.to_string(), binding.to_string()))
                })
        };

        let (sso_url, sso_binding) = pick("SingleSignOnService")
            .ok_or_else(|| AppError::Saml("IdP metadata has no SingleSignOnService".into()))?;
        let slo_url = pick("SingleLogoutService").map(|(url, _)| url);

        // A KeyDescriptor without `use` serves both signing and encryption
        let signing_certificates = idp
            .children_named("KeyDescriptor")
            .filter(|k| matches!(k.attr("use"), None | Some("signing")))
            .filter_map(|k| k.find("X509Certificate").and_then(|c| c.text()))
            .map(|c| c.chars().filter(|ch| !ch.is_whitespace()).collect())
            .collect();

        Ok(Self {
            entity_id,
            sso_url,
            sso_binding,
            slo_url,
            signing_certificates,
        })
    }
}

/// Download and parse the IdP metadata document
pub async fn fetch_idp_metadata(http: &reqwest::Client, url: &str) -> Result<IdpMetadata, AppError> {
    tracing::debug!(url = %url, "Fetching IdP metadata");
    let response = http.get(url).send().await?;
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(AppError::Api {
            status: status.as_u16(),
            body,
        });
    }
    let metadata = IdpMetadata::parse(&body)?;
    tracing::info!(
        entity_id = %metadata.entity_id,
        signing_certificates = metadata.signing_certificates.len(),
        "Loaded IdP metadata"
    );
    Ok(metadata)
}

/// SAML service provider state for the demo server
#[derive(Debug)]
pub struct SamlServiceProvider {
    config: SamlConfig,
    store: TokenStore,
    http: reqwest::Client,
    idp: Option<IdpMetadata>,
    outstanding: HashSet<String>,
}

impl SamlServiceProvider {
    /// Create a service provider; IdP metadata is fetched lazily
    pub fn new(config: SamlConfig, store: TokenStore, http: reqwest::Client) -> Self {
        Self {
            config,
            store,
            http,
            idp: None,
            outstanding: HashSet::new(),
        }
    }

    /// Use already-known IdP metadata instead of fetching it
    pub fn with_idp_metadata(mut self, idp: IdpMetadata) -> Self {
        self.idp = Some(idp);
        self
    }

    /// Token store backing this provider
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// IDs of requests still awaiting a response
    pub fn outstanding_requests(&self) -> &HashSet<String> {
        &self.outstanding
    }

    /// Cached IdP metadata
    pub fn idp_metadata(&self) -> Option<&IdpMetadata> {
        self.idp.as_ref()
    }

    /// Cache IdP metadata fetched elsewhere
    pub fn set_idp_metadata(&mut self, idp: IdpMetadata) {
        self.idp = Some(idp);
    }

    /// HTTP client and URL to fetch the IdP metadata with
    ///
    /// Lets callers download the document without borrowing the provider.
    pub fn metadata_source(&self) -> (reqwest::Client, String) {
        (self.http.clone(), self.config.idp_metadata_url.clone())
    }

    fn idp(&self) -> Result<&IdpMetadata, AppError> {
        self.idp
            .as_ref()
            .ok_or_else(|| AppError::Saml("IdP metadata has not been loaded".into()))
    }

    /// Build the redirect URL carrying a new AuthnRequest
    ///
    /// # Arguments
    /// * `relay_state` - Where the user lands after login
    ///
    /// # Returns
    /// * `(request_id, url)` - The request is remembered as outstanding
    ///
    /// # Errors
    /// * `AppError::Saml` if the IdP metadata has not been loaded
    pub fn auth_request_url(&mut self, relay_state: &str) -> Result<(String, String), AppError> {
        let sso_url = self.idp()?.sso_url.clone();
        let id = new_request_id();
        let instant = now_instant();

        let xml = authn_request_xml(&AuthnRequestParams {
            id: &id,
            issue_instant: &instant,
            destination: &sso_url,
            issuer: &self.config.sp_entity_id,
            acs_url: &self.config.sp_acs_url,
        });

        let url = redirect_url(&sso_url, "SAMLRequest", &xml, Some(relay_state))?;
        self.outstanding.insert(id.clone());
        tracing::debug!(request_id = %id, "Prepared SAML AuthnRequest");
        Ok((id, url))
    }

    /// Validate a POSTed `SAMLResponse` and store the session it carries
    ///
    /// # Returns
    /// * The assertion's attributes
    ///
    /// # Errors
    /// * `AppError::Saml` if the status is not Success, the assertion is not
    ///   signed by the IdP, the response answers an unknown request, the
    ///   audience does not match, or the assertion expired
    pub fn process_saml_response(
        &mut self,
        saml_response: &str,
    ) -> Result<BTreeMap<String, Vec<String>>, AppError> {
        let xml = decode_post_binding(saml_response)?;
        let session = self.validate_response(&xml, Utc::now())?;
        self.store.save_saml(&session)?;
        tracing::info!(
            attribute_count = session.attributes.len(),
            has_session_index = session.session_index.is_some(),
            "Stored SAML session"
        );
        Ok(session.attributes)
    }

    /// Check a decoded Response document and extract its session
    pub fn validate_response(
        &mut self,
        xml: &str,
        now: DateTime<Utc>,
    ) -> Result<SamlSession, AppError> {
        let root = XmlElement::parse(xml)?;
        if root.name != "Response" {
            return Err(AppError::Saml(format!(
                "Expected a Response, got {}",
                root.name
            )));
        }

        check_status(&root)?;

        let idp = self.idp()?;
        let signatures = verify_response(xml, &idp.signing_certificates)?;
        if !signatures.assertion {
            return Err(AppError::Saml("Assertion is not signed".into()));
        }
        let idp_entity_id = idp.entity_id.clone();

        if let Some(in_response_to) = root.attr("InResponseTo") {
            if !self.outstanding.remove(in_response_to) {
                return Err(AppError::Saml(format!(
                    "Response answers unknown request {}",
                    in_response_to
                )));
            }
        }

        let assertion = match root.child("Assertion") {
            Some(assertion) => assertion,
            None if root.child("EncryptedAssertion").is_some() => {
                return Err(AppError::Saml(
                    "Encrypted assertions are not supported".into(),
                ))
            }
            None => return Err(AppError::Saml("Response contains no assertion".into())),
        };

        if let Some(conditions) = assertion.child("Conditions") {
            self.check_conditions(conditions, now)?;
        }

        let name_id = assertion
            .path(&["Subject", "NameID"])
            .ok_or_else(|| AppError::Saml("Assertion has no NameID".into()))?;

        for issuer in [assertion.child("Issuer"), root.child("Issuer")]
            .into_iter()
            .flatten()
            .filter_map(|i| i.text())
        {
            if issuer != idp_entity_id {
                return Err(AppError::Saml(format!("Unexpected issuer {}", issuer)));
            }
        }
        let issuer = assertion
            .child("Issuer")
            .or_else(|| root.child("Issuer"))
            .and_then(|i| i.text())
            .map(str::to_string);

        let session_index = assertion
            .child("AuthnStatement")
            .and_then(|s| s.attr("SessionIndex"))
            .map(str::to_string);

        let mut attributes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for statement in assertion.children_named("AttributeStatement") {
            for attribute in statement.children_named("Attribute") {
                let Some(name) = attribute.attr("Name") else {
                    continue;
                };
                let values = attribute
                    .children_named("AttributeValue")
                    .filter_map(|v| v.text())
                    .map(str::to_string);
                attributes.entry(name.to_string()).or_default().extend(values);
            }
        }

        Ok(SamlSession {
            name_id: name_id.text().unwrap_or_default().to_string(),
            name_id_format: name_id.attr("Format").map(str::to_string),
            session_index,
            issuer,
            attributes,
            authenticated: true,
        })
    }

    fn check_conditions(&self, conditions: &XmlElement, now: DateTime<Utc>) -> Result<(), AppError> {
        if let Some(not_before) = conditions.attr("NotBefore") {
            let not_before = parse_instant(not_before)?;
            if now + chrono::Duration::seconds(CLOCK_SKEW_SECS) < not_before {
                return Err(AppError::Saml("Assertion is not yet valid".into()));
            }
        }
        if let Some(not_on_or_after) = conditions.attr("NotOnOrAfter") {
            let not_on_or_after = parse_instant(not_on_or_after)?;
            if now >= not_on_or_after {
                return Err(AppError::Saml("Assertion has expired".into()));
            }
        }

        let audiences: Vec<&str> = conditions
            .children_named("AudienceRestriction")
            .flat_map(|r| r.children_named("Audience"))
            .filter_map(|a| a.text())
            .collect();
        if !audiences.is_empty() && !audiences.contains(&self.config.sp_entity_id.as_str()) {
            return Err(AppError::Saml(format!(
                "Assertion audience {:?} does not include {}",
                audiences, self.config.sp_entity_id
            )));
        }
        Ok(())
    }

    /// Build the redirect URL carrying a LogoutRequest for the stored session
    ///
    /// Returns `/` when no SAML session is stored.
    pub fn logout_url(&mut self) -> Result<String, AppError> {
        let Some(session) = self.store.load_saml()? else {
            return Ok("/".to_string());
        };
        if session.name_id.is_empty() {
            return Ok("/".to_string());
        }

        let slo_url = self
            .idp()?
            .slo_url
            .clone()
            .ok_or_else(|| AppError::Saml("IdP metadata has no SingleLogoutService".into()))?;

        let id = new_request_id();
        let instant = now_instant();
        let xml = logout_request_xml(&LogoutRequestParams {
            id: &id,
            issue_instant: &instant,
            destination: &slo_url,
            issuer: &self.config.sp_entity_id,
            name_id: &session.name_id,
            name_id_format: session.name_id_format.as_deref(),
            session_index: session.session_index.as_deref(),
        });

        let url = redirect_url(&slo_url, "SAMLRequest", &xml, Some("/"))?;
        self.outstanding.insert(id);
        Ok(url)
    }

    /// Handle a LogoutResponse from the IdP
    ///
    /// # Returns
    /// * `true` if the IdP reported Success and the local session was cleared
    pub fn process_logout_response(&mut self, saml_response: &str) -> Result<bool, AppError> {
        let xml = decode_redirect_binding(saml_response)?;
        let root = XmlElement::parse(&xml)?;
        if root.name != "LogoutResponse" {
            return Err(AppError::Saml(format!(
                "Expected a LogoutResponse, got {}",
                root.name
            )));
        }
        if let Some(in_response_to) = root.attr("InResponseTo") {
            self.outstanding.remove(in_response_to);
        }
        if check_status(&root).is_err() {
            return Ok(false);
        }
        self.store.clear()?;
        Ok(true)
    }

    /// SP metadata document to register with the IdP
    pub fn sp_metadata_xml(&self) -> String {
        let sls = (!self.config.sp_sls_url.is_empty()).then_some(self.config.sp_sls_url.as_str());
        sp_metadata_xml(&self.config.sp_entity_id, &self.config.sp_acs_url, sls)
    }
}

fn check_status(root: &XmlElement) -> Result<(), AppError> {
    let status = root
        .path(&["Status", "StatusCode"])
        .and_then(|s| s.attr("Value"))
        .unwrap_or_default();
    if status != STATUS_SUCCESS {
        let message = root
            .path(&["Status", "StatusMessage"])
            .and_then(|m| m.text())
            .unwrap_or("no status message");
        return Err(AppError::Saml(format!(
            "IdP returned status {:?}: {}",
            status, message
        )));
    }
    Ok(())
}

fn parse_instant(value: &str) -> Result<DateTime<Utc>, AppError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::Saml(format!("Invalid SAML timestamp {}: {}", value, e)))
}

fn new_request_id() -> String {
    format!("_{}", Uuid::new_v4().simple())
}

fn now_instant() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Encode a message for the HTTP-Redirect binding and append it to `endpoint`
///
/// The XML is raw-DEFLATE compressed, base64 encoded and URL encoded.
pub fn redirect_url(
    endpoint: &str,
    param: &str,
    xml: &str,
    relay_state: Option<&str>,
) -> Result<String, AppError> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(xml.as_bytes())
        .map_err(|e| AppError::Saml(format!("Failed to deflate SAML message: {}", e)))?;
    let compressed = encoder
        .finish()
        .map_err(|e| AppError::Saml(format!("Failed to deflate SAML message: {}", e)))?;

    let mut url = Url::parse(endpoint)
        .map_err(|e| AppError::Saml(format!("Invalid IdP endpoint {}: {}", endpoint, e)))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair(param, &STANDARD.encode(compressed));
        if let Some(relay_state) = relay_state {
            query.append_pair("RelayState", relay_state);
        }
    }
    Ok(url.to_string())
}

/// Decode a base64 message from the HTTP-POST binding
pub fn decode_post_binding(encoded: &str) -> Result<String, AppError> {
    let bytes = decode_base64(encoded)?;
    String::from_utf8(bytes).map_err(|e| AppError::Saml(format!("SAML message is not UTF-8: {}", e)))
}

/// Decode a message from the HTTP-Redirect binding
///
/// Falls back to the un-inflated bytes when the payload is not deflated.
pub fn decode_redirect_binding(encoded: &str) -> Result<String, AppError> {
    let bytes = decode_base64(encoded)?;
    let mut inflated = String::new();
    match DeflateDecoder::new(bytes.as_slice()).read_to_string(&mut inflated) {
        Ok(_) => Ok(inflated),
        Err(_) => String::from_utf8(bytes)
            .map_err(|e| AppError::Saml(format!("SAML message is not UTF-8: {}", e))),
    }
}

fn decode_base64(encoded: &str) -> Result<Vec<u8>, AppError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| AppError::Saml(format!("SAML message is not valid base64: {}", e)))
}
