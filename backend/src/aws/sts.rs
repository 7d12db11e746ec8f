//! AWS STS `AssumeRoleWithWebIdentity`
//!
//! The call is unsigned: the web identity token is the credential.

use crate::aws::credentials::AwsCredentials;
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::Deserialize;

const STS_API_VERSION: &str = "2011-06-15";
const MAX_SESSION_NAME_LEN: usize = 64;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleWithWebIdentityResponse {
    assume_role_with_web_identity_result: AssumeRoleWithWebIdentityResult,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AssumeRoleWithWebIdentityResult {
    credentials: StsCredentials,
    #[serde(default)]
    subject_from_web_identity_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct StsCredentials {
    access_key_id: String,
    secret_access_key: String,
    session_token: String,
    #[serde(default)]
    expiration: Option<String>,
}

/// Client for the STS query API
#[derive(Debug, Clone)]
pub struct StsClient {
    http: reqwest::Client,
    endpoint: String,
}

impl StsClient {
    /// Regional STS endpoint
    pub fn new(http: reqwest::Client, region: &str) -> Self {
        Self::with_endpoint(http, format!("https://sts.{}.amazonaws.com/", region))
    }

    /// Custom endpoint (used by tests)
    pub fn with_endpoint(http: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }

    /// Exchange an OIDC token for temporary role credentials
    ///
    /// # Arguments
    /// * `role_arn` - Role trusted for the token's issuer
    /// * `session_name` - Role session name (truncated to 64 characters)
    /// * `web_identity_token` - OIDC ID token
    pub async fn assume_role_with_web_identity(
        &self,
        role_arn: &str,
        session_name: &str,
        web_identity_token: &str,
    ) -> Result<AwsCredentials, AppError> {
        let session_name: String = session_name.chars().take(MAX_SESSION_NAME_LEN).collect();
        let form = [
            ("Action", "AssumeRoleWithWebIdentity"),
            ("Version", STS_API_VERSION),
            ("RoleArn", role_arn),
            ("RoleSessionName", session_name.as_str()),
            ("WebIdentityToken", web_identity_token),
        ];

        tracing::debug!(role_arn = %role_arn, session_name = %session_name, "Assuming role with web identity");

        let response = self.http.post(&self.endpoint).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::error!(status_code = status.as_u16(), "STS returned error status");
            return Err(AppError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let credentials = parse_assume_role_response(&body)?;
        tracing::info!(
            role_arn = %role_arn,
            expiration = ?credentials.expiration,
            "Obtained temporary credentials"
        );
        Ok(credentials)
    }
}

fn parse_assume_role_response(xml: &str) -> Result<AwsCredentials, AppError> {
    let response: AssumeRoleWithWebIdentityResponse = quick_xml::de::from_str(xml)
        .map_err(|e| AppError::Parse(format!("Invalid STS response: {}", e)))?;
    let result = response.assume_role_with_web_identity_result;
    if let Some(subject) = &result.subject_from_web_identity_token {
        tracing::debug!(subject = %subject, "STS accepted web identity");
    }

    let expiration = result
        .credentials
        .expiration
        .as_deref()
        .and_then(|e| DateTime::parse_from_rfc3339(e).ok())
        .map(|e| e.with_timezone(&Utc));

    Ok(AwsCredentials {
        access_key_id: result.credentials.access_key_id,
        secret_access_key: result.credentials.secret_access_key,
        session_token: Some(result.credentials.session_token),
        expiration,
    })
}
