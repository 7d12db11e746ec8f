//! AWS credentials used for request signing

use crate::error::AppError;
use aws_credential_types::Credentials;
use aws_smithy_runtime_api::client::identity::Identity;
use chrono::{DateTime, Utc};
use std::env;
use std::time::SystemTime;

const PROVIDER_NAME: &str = "okta-q";

/// Access key pair plus optional session token
#[derive(Clone, PartialEq, Eq)]
pub struct AwsCredentials {
    /// Access key ID
    pub access_key_id: String,
    /// Secret access key
    pub secret_access_key: String,
    /// Session token for temporary credentials
    pub session_token: Option<String>,
    /// Expiry of temporary credentials
    pub expiration: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .field("expiration", &self.expiration)
            .finish()
    }
}

impl AwsCredentials {
    /// Long-lived or temporary credentials from explicit values
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
            expiration: None,
        }
    }

    /// Read `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY` and `AWS_SESSION_TOKEN`
    pub fn from_env() -> Result<Self, AppError> {
        let read = |name: &str| env::var(name).ok().filter(|v| !v.is_empty());
        match (read("AWS_ACCESS_KEY_ID"), read("AWS_SECRET_ACCESS_KEY")) {
            (Some(access_key_id), Some(secret_access_key)) => Ok(Self::new(
                access_key_id,
                secret_access_key,
                read("AWS_SESSION_TOKEN"),
            )),
            _ => Err(AppError::Config(
                "AWS credentials must be provided or available in environment variables"
                    .to_string(),
            )),
        }
    }

    /// Explicit keys when both are given, the environment otherwise
    pub fn explicit_or_env(
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        session_token: Option<String>,
    ) -> Result<Self, AppError> {
        match (access_key_id, secret_access_key) {
            (Some(access_key_id), Some(secret_access_key)) => {
                Ok(Self::new(access_key_id, secret_access_key, session_token))
            }
            _ => Self::from_env(),
        }
    }

    /// Signing identity for `aws-sigv4`
    pub fn to_identity(&self) -> Identity {
        let expires_after = self.expiration.map(SystemTime::from);
        Credentials::new(
            self.access_key_id.clone(),
            self.secret_access_key.clone(),
            self.session_token.clone(),
            expires_after,
            PROVIDER_NAME,
        )
        .into()
    }
}
