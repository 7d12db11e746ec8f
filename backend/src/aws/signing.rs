//! SigV4-signed JSON requests
//!
//! Signing itself is delegated to `aws-sigv4`; this module turns its
//! instructions into headers on a `reqwest` request.

use crate::aws::credentials::AwsCredentials;
use crate::error::AppError;
use aws_sigv4::http_request::{
    sign, SignableBody, SignableRequest, SigningParams, SigningSettings,
};
use aws_sigv4::sign::v4;
use reqwest::Method;
use serde_json::Value;
use std::time::SystemTime;

/// Signs requests for one service in one region
#[derive(Debug, Clone)]
pub struct AwsSigner {
    credentials: AwsCredentials,
    region: String,
    service: &'static str,
}

impl AwsSigner {
    /// Create a signer
    ///
    /// # Arguments
    /// * `credentials` - Keys the signature is computed with
    /// * `region` - Signing region
    /// * `service` - Signing name (`qbusiness`, `kendra`, ...)
    pub fn new(credentials: AwsCredentials, region: impl Into<String>, service: &'static str) -> Self {
        Self {
            credentials,
            region: region.into(),
            service,
        }
    }

    /// Signing region
    pub fn region(&self) -> &str {
        &self.region
    }

    /// Compute the headers to add to a request
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `url` - Full URL including query string
    /// * `headers` - Headers that will be sent and must be covered by the signature
    /// * `body` - Exact body bytes
    ///
    /// # Returns
    /// * `Vec<(name, value)>` - `authorization`, `x-amz-date` and, for
    ///   temporary credentials, `x-amz-security-token`
    pub fn sign(
        &self,
        method: &Method,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
    ) -> Result<Vec<(String, String)>, AppError> {
        self.sign_at(method, url, headers, body, SystemTime::now())
    }

    /// [`AwsSigner::sign`] at a fixed time
    pub fn sign_at(
        &self,
        method: &Method,
        url: &str,
        headers: &[(&str, &str)],
        body: &[u8],
        time: SystemTime,
    ) -> Result<Vec<(String, String)>, AppError> {
        let identity = self.credentials.to_identity();
        let params: SigningParams<'_> = v4::SigningParams::builder()
            .identity(&identity)
            .region(&self.region)
            .name(self.service)
            .time(time)
            .settings(SigningSettings::default())
            .build()
            .map_err(|e| AppError::Signing(e.to_string()))?
            .into();

        let signable = SignableRequest::new(
            method.as_str(),
            url,
            headers.iter().copied(),
            SignableBody::Bytes(body),
        )
        .map_err(|e| AppError::Signing(e.to_string()))?;

        let (instructions, _signature) = sign(signable, &params)
            .map_err(|e| AppError::Signing(e.to_string()))?
            .into_parts();

        Ok(instructions
            .headers()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect())
    }
}

/// Send a signed request carrying a JSON body and decode the JSON answer
///
/// # Arguments
/// * `http` - Shared HTTP client
/// * `signer` - Signer for the target service
/// * `method` - HTTP method
/// * `url` - Full URL
/// * `content_type` - Value of `Content-Type` (`application/json`, `application/x-amz-json-1.1`)
/// * `extra_headers` - Additional signed headers (e.g. `X-Amz-Target`)
/// * `body` - JSON body, if any
///
/// # Errors
/// * `AppError::Api` for HTTP status >= 400
pub async fn send_signed_json(
    http: &reqwest::Client,
    signer: &AwsSigner,
    method: Method,
    url: &str,
    content_type: &str,
    extra_headers: &[(&str, &str)],
    body: Option<&Value>,
) -> Result<Value, AppError> {
    let payload = match body {
        Some(body) => serde_json::to_vec(body)?,
        None => Vec::new(),
    };

    let mut headers: Vec<(&str, &str)> = vec![
        ("content-type", content_type),
        ("accept", "application/json"),
    ];
    headers.extend_from_slice(extra_headers);

    let signed = signer.sign(&method, url, &headers, &payload)?;

    tracing::debug!(
        method = %method,
        url = %url,
        body_len = payload.len(),
        "Sending signed AWS request"
    );

    let mut request = http.request(method, url);
    for (name, value) in headers.iter() {
        request = request.header(*name, *value);
    }
    for (name, value) in signed.iter() {
        request = request.header(name.as_str(), value.as_str());
    }
    if !payload.is_empty() {
        request = request.body(payload);
    }

    let response = request.send().await?;
    let status = response.status();
    let text = response.text().await?;

    if status.as_u16() >= 400 {
        tracing::error!(status_code = status.as_u16(), url = %url, "AWS API returned error status");
        return Err(AppError::Api {
            status: status.as_u16(),
            body: text,
        });
    }

    if text.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    serde_json::from_str(&text)
        .map_err(|e| AppError::Parse(format!("{} - Response body: {}", e, text)))
}
