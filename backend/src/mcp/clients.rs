//! Per-call AWS client construction for the MCP tools
//!
//! Tools may name a region, so clients are built per call from the shared
//! configuration and HTTP client.

use crate::aws::qbusiness::{QBusinessClient, QBusinessSettings};
use crate::aws::{identity_aware_credentials, AwsCredentials, KendraClient};
use crate::config::Config;
use crate::error::AppError;
use std::time::Duration;

/// Builds Q Business and Kendra clients for a region
#[derive(Debug, Clone)]
pub struct AwsClientFactory {
    config: Config,
    http: reqwest::Client,
    credentials: Option<AwsCredentials>,
    qbusiness_endpoint: Option<String>,
    kendra_endpoint: Option<String>,
}

impl AwsClientFactory {
    /// Factory over `config`, with the configured request timeout
    pub fn new(config: Config) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.storage.http_timeout_secs))
            .build()?;
        Ok(Self {
            config,
            http,
            credentials: None,
            qbusiness_endpoint: None,
            kendra_endpoint: None,
        })
    }

    /// Use fixed credentials instead of the environment or STS
    pub fn with_credentials(mut self, credentials: AwsCredentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Send Q Business calls to another endpoint (used by tests)
    pub fn with_qbusiness_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.qbusiness_endpoint = Some(endpoint.into());
        self
    }

    /// Send Kendra calls to another endpoint (used by tests)
    pub fn with_kendra_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.kendra_endpoint = Some(endpoint.into());
        self
    }

    /// Configuration the factory was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Tool argument region, else the configured one, else `us-east-1`
    pub fn region(&self, requested: Option<&str>) -> String {
        requested
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.config.region_or_default())
    }

    fn plain_credentials(&self) -> Result<AwsCredentials, AppError> {
        match &self.credentials {
            Some(credentials) => Ok(credentials.clone()),
            None => AwsCredentials::from_env(),
        }
    }

    fn build_qbusiness(
        &self,
        region: &str,
        credentials: AwsCredentials,
    ) -> Result<QBusinessClient, AppError> {
        let settings = QBusinessSettings {
            region: region.to_string(),
            application_id: self.config.aws.q_application_id.clone(),
            user_id: None,
        };
        let client = QBusinessClient::new(settings, credentials, self.http.clone())?;
        Ok(match &self.qbusiness_endpoint {
            Some(endpoint) => client.with_endpoint(endpoint.clone()),
            None => client,
        })
    }

    /// Q Business client signed with the environment credentials
    pub fn qbusiness(&self, region: &str) -> Result<QBusinessClient, AppError> {
        self.build_qbusiness(region, self.plain_credentials()?)
    }

    /// Q Business client signed with credentials for the configured identity
    pub async fn identity_aware_qbusiness(
        &self,
        region: &str,
    ) -> Result<QBusinessClient, AppError> {
        let credentials = match &self.credentials {
            Some(credentials) => credentials.clone(),
            None => identity_aware_credentials(&self.config, &self.http, region, None).await?,
        };
        self.build_qbusiness(region, credentials)
    }

    /// Kendra client for `region`
    pub fn kendra(&self, region: &str) -> Result<KendraClient, AppError> {
        let client = KendraClient::new(region, self.plain_credentials()?, self.http.clone());
        Ok(match &self.kendra_endpoint {
            Some(endpoint) => client.with_endpoint(endpoint.clone()),
            None => client,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_fallbacks() {
        let mut config = Config::default();
        config.aws.region = Some("eu-central-1".to_string());
        let factory = AwsClientFactory::new(config.clone()).unwrap();
        assert_eq!(factory.region(Some("ap-south-1")), "ap-south-1");
        assert_eq!(factory.region(Some("  ")), "eu-central-1");
        assert_eq!(factory.region(None), "eu-central-1");

        config.aws.region = None;
        let factory = AwsClientFactory::new(config).unwrap();
        assert_eq!(factory.region(None), "us-east-1");
    }
}
