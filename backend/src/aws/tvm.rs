//! Token vending machine client
//!
//! The TVM issues an OIDC ID token for an email; STS then exchanges it for
//! role credentials scoped to that identity.

use crate::aws::credentials::AwsCredentials;
use crate::aws::sts::StsClient;
use crate::config::TvmConfig;
use crate::error::AppError;
use serde::Deserialize;
use serde_json::json;

#[derive(Debug, Deserialize)]
struct TvmTokenResponse {
    id_token: String,
}

/// Client for a token vending machine issuer
#[derive(Debug, Clone)]
pub struct TvmClient {
    config: TvmConfig,
    http: reqwest::Client,
    sts: StsClient,
}

impl TvmClient {
    /// Create a client that assumes roles through `sts`
    pub fn new(config: TvmConfig, http: reqwest::Client, sts: StsClient) -> Self {
        Self { config, http, sts }
    }

    fn token_url(&self) -> String {
        if self.config.issuer.ends_with('/') {
            format!("{}token", self.config.issuer)
        } else {
            format!("{}/token", self.config.issuer)
        }
    }

    /// Request an ID token for `email`
    pub async fn fetch_id_token(&self, email: &str) -> Result<String, AppError> {
        let url = self.token_url();
        tracing::debug!(url = %url, email = %email, "Requesting ID token from TVM");

        let response = self
            .http
            .post(&url)
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .json(&json!({ "email": email }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(status_code = status.as_u16(), "TVM returned error status");
            return Err(AppError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let token: TvmTokenResponse = response.json().await?;
        tracing::debug!(token_len = token.id_token.len(), "Received ID token from TVM");
        Ok(token.id_token)
    }

    /// ID token for `email`, exchanged for SigV4 credentials on the configured role
    pub async fn get_sigv4_credentials(&self, email: &str) -> Result<AwsCredentials, AppError> {
        let id_token = self.fetch_id_token(email).await?;
        self.sts
            .assume_role_with_web_identity(
                &self.config.role_arn,
                &format!("session-{}", email),
                &id_token,
            )
            .await
    }

    /// Credentials for the email in the configuration
    pub async fn configured_credentials(&self) -> Result<AwsCredentials, AppError> {
        let email = self.config.email.clone();
        self.get_sigv4_credentials(&email).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    const STS_BODY: &str = "<AssumeRoleWithWebIdentityResponse><AssumeRoleWithWebIdentityResult>\
        <Credentials><AccessKeyId>ASIATVM</AccessKeyId><SecretAccessKey>s</SecretAccessKey>\
        <SessionToken>t</SessionToken></Credentials>\
        </AssumeRoleWithWebIdentityResult></AssumeRoleWithWebIdentityResponse>";

    fn tvm_config(issuer: String) -> TvmConfig {
        TvmConfig {
            issuer,
            client_id: "tvm-client".to_string(),
            client_secret: "tvm-secret".to_string(),
            role_arn: "arn:aws:iam::1:role/tvm".to_string(),
            email: "user@example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_vended_token_is_exchanged() {
        let mut server = Server::new_async().await;
        let token_mock = server
            .mock("POST", "/token")
            .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
            .match_body(Matcher::Json(json!({"email": "user@example.com"})))
            .with_status(200)
            .with_body(r#"{"id_token":"vended"}"#)
            .create_async()
            .await;
        let sts_mock = server
            .mock("POST", "/sts/")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("WebIdentityToken".into(), "vended".into()),
                Matcher::UrlEncoded("RoleSessionName".into(), "session-user@example.com".into()),
            ]))
            .with_status(200)
            .with_body(STS_BODY)
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let sts = StsClient::with_endpoint(http.clone(), format!("{}/sts/", server.url()));
        let tvm = TvmClient::new(tvm_config(format!("{}/", server.url())), http, sts);

        let creds = tvm.configured_credentials().await.unwrap();
        token_mock.assert_async().await;
        sts_mock.assert_async().await;
        assert_eq!(creds.access_key_id, "ASIATVM");
    }

    #[tokio::test]
    async fn test_issuer_error_surfaces() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .with_status(401)
            .with_body("denied")
            .create_async()
            .await;

        let http = reqwest::Client::new();
        let sts = StsClient::with_endpoint(http.clone(), server.url());
        let tvm = TvmClient::new(tvm_config(server.url()), http, sts);

        let err = tvm.fetch_id_token("user@example.com").await.unwrap_err();
        assert_eq!(err.api_status(), Some(401));
    }
}
