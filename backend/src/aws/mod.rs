//! AWS clients
//!
//! Hand-rolled REST/JSON clients for Amazon Q Business and Kendra, signed
//! with SigV4, plus the STS and token-vending pieces that turn an OIDC
//! identity into role credentials.

pub mod credentials;
pub mod kendra;
pub mod qbusiness;
pub mod qbusiness_types;
pub mod signing;
pub mod sts;
pub mod tvm;

pub use credentials::AwsCredentials;
pub use kendra::KendraClient;
pub use qbusiness::{QBusinessClient, QBusinessSettings};
pub use sts::StsClient;
pub use tvm::TvmClient;

use crate::config::Config;
use crate::error::AppError;

const OKTA_SESSION_NAME: &str = "okta-q-session";

/// Credentials carrying the caller's identity when one is configured
///
/// Order of preference:
/// 1. `Q_BUSINESS_ROLE_ARN` with an Okta ID token, through STS
/// 2. the token vending machine, when `TVM_*` is configured
/// 3. the environment credentials
pub async fn identity_aware_credentials(
    config: &Config,
    http: &reqwest::Client,
    region: &str,
    id_token: Option<&str>,
) -> Result<AwsCredentials, AppError> {
    if let (Some(role_arn), Some(token)) = (config.aws.q_role_arn.as_deref(), id_token) {
        tracing::info!(role_arn = %role_arn, "Using Okta identity for AWS credentials");
        return StsClient::new(http.clone(), region)
            .assume_role_with_web_identity(role_arn, OKTA_SESSION_NAME, token)
            .await;
    }

    if let Some(tvm) = &config.mcp.tvm {
        tracing::info!(issuer = %tvm.issuer, "Using token vending machine for AWS credentials");
        let sts = StsClient::new(http.clone(), region);
        return TvmClient::new(tvm.clone(), http.clone(), sts)
            .configured_credentials()
            .await;
    }

    AwsCredentials::from_env()
}
