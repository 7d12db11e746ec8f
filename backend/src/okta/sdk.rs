//! Typed Okta directory client
//!
//! Same endpoints as [`OktaApiClient`], returning [`crate::okta::models`]
//! instead of raw JSON.

use crate::error::AppError;
use crate::okta::api::OktaApiClient;
use crate::okta::models::{
    Application, PasswordCredential, User, UserCredentials, UserFactor, UserProfile,
};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Typed wrapper around the management API
#[derive(Debug, Clone)]
pub struct OktaClient {
    api: OktaApiClient,
}

impl OktaClient {
    /// Wrap an API-token client
    pub fn new(api: OktaApiClient) -> Self {
        Self { api }
    }

    /// List users
    pub async fn list_users(&self, limit: u32) -> Result<Vec<User>, AppError> {
        decode_list(self.api.list_users(None, limit).await?)
    }

    /// Get a user by ID or login
    pub async fn get_user(&self, user_id: &str) -> Result<User, AppError> {
        decode(self.api.get_user(user_id).await?)
    }

    /// Create a user whose login is their email
    pub async fn create_user(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        password: &str,
        activate: bool,
    ) -> Result<User, AppError> {
        let user = User {
            profile: UserProfile {
                first_name: Some(first_name.to_string()),
                last_name: Some(last_name.to_string()),
                email: Some(email.to_string()),
                login: Some(email.to_string()),
                ..Default::default()
            },
            credentials: Some(UserCredentials {
                password: Some(PasswordCredential {
                    value: Some(password.to_string()),
                }),
            }),
            ..Default::default()
        };

        let profile = serde_json::to_value(&user.profile)?;
        let credentials = user
            .credentials
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;
        decode(self.api.create_user(profile, credentials, activate).await?)
    }

    /// List applications
    pub async fn list_applications(&self) -> Result<Vec<Application>, AppError> {
        decode_list(self.api.list_applications(None).await?)
    }

    /// List a user's enrolled factors
    pub async fn list_factors(&self, user_id: &str) -> Result<Vec<UserFactor>, AppError> {
        let value = self
            .api
            .make_api_request(&format!("users/{}/factors", urlencoding::encode(user_id)), Method::GET, None, &[])
            .await?;
        match value {
            Value::Array(items) => decode_list(items),
            _ => Ok(Vec::new()),
        }
    }

    /// Find a user by exact email match
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        let search = format!("profile.email eq \"{}\"", email.replace('"', "\\\""));
        let users = self.api.list_users(Some(&search), 1).await?;
        users.into_iter().next().map(decode).transpose()
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> Result<T, AppError> {
    Ok(serde_json::from_value(value)?)
}

fn decode_list<T: DeserializeOwned>(values: Vec<Value>) -> Result<Vec<T>, AppError> {
    values.into_iter().map(decode).collect()
}
