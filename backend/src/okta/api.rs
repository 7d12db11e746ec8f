//! Okta Management API client
//!
//! Authenticates with an API token using Okta's `SSWS` scheme and returns raw
//! JSON; [`crate::okta::sdk`] layers typed models on top.

use crate::config::OktaConfig;
use crate::error::AppError;
use crate::okta::oauth::{client_credentials_token, CLIENT_CREDENTIALS_SCOPE};
use crate::state::{TokenRecord, TokenStore};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde_json::{json, Value};
use urlencoding::encode;

/// Client for `{org}/api/v1`
#[derive(Debug, Clone)]
pub struct OktaApiClient {
    http: reqwest::Client,
    org_url: String,
    api_token: String,
    store: TokenStore,
}

impl OktaApiClient {
    /// Create a client for the configured organization
    pub fn new(config: &OktaConfig, store: TokenStore, http: reqwest::Client) -> Self {
        Self {
            http,
            org_url: config.org_url.trim_end_matches('/').to_string(),
            api_token: config.api_token.clone(),
            store,
        }
    }

    /// Headers sent with every management request
    pub fn api_headers(&self) -> Result<HeaderMap, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let auth = HeaderValue::from_str(&format!("SSWS {}", self.api_token))
            .map_err(|e| AppError::Config(format!("Invalid API token: {}", e)))?;
        headers.insert(AUTHORIZATION, auth);
        Ok(headers)
    }

    /// Call `{org}/api/v1/{endpoint}`
    ///
    /// # Arguments
    /// * `endpoint` - Path below `/api/v1` (a leading `/` is ignored)
    /// * `method` - GET, POST, PUT or DELETE
    /// * `body` - JSON body for POST/PUT
    /// * `query` - Query parameters
    ///
    /// # Returns
    /// * The decoded JSON body, or `{}` when the body is empty
    ///
    /// # Errors
    /// * `AppError::InvalidInput` for any other method
    /// * `AppError::Api` when Okta answers with a non-2xx status
    pub async fn make_api_request(
        &self,
        endpoint: &str,
        method: Method,
        body: Option<&Value>,
        query: &[(&str, String)],
    ) -> Result<Value, AppError> {
        let url = format!("{}/api/v1/{}", self.org_url, endpoint.trim_start_matches('/'));

        let request = match method {
            Method::GET | Method::DELETE => self.http.request(method.clone(), &url),
            Method::POST | Method::PUT => {
                let request = self.http.request(method.clone(), &url);
                match body {
                    Some(body) => request.json(body),
                    None => request,
                }
            }
            other => {
                return Err(AppError::InvalidInput(format!(
                    "Unsupported HTTP method: {}",
                    other
                )))
            }
        };

        tracing::debug!(method = %method, endpoint = %endpoint, "Okta API request");

        let response = request
            .headers(self.api_headers()?)
            .query(query)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            tracing::error!(
                status_code = status.as_u16(),
                endpoint = %endpoint,
                "Okta API returned error status"
            );
            return Err(AppError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        if text.trim().is_empty() {
            return Ok(json!({}));
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn get_list(&self, endpoint: &str, query: &[(&str, String)]) -> Result<Vec<Value>, AppError> {
        let value = self
            .make_api_request(endpoint, Method::GET, None, query)
            .await?;
        Ok(match value {
            Value::Array(items) => items,
            _ => Vec::new(),
        })
    }

    /// List users, optionally filtered by a search expression
    pub async fn list_users(&self, search: Option<&str>, limit: u32) -> Result<Vec<Value>, AppError> {
        let mut query = vec![("limit", limit.to_string())];
        if let Some(search) = search {
            query.push(("search", search.to_string()));
        }
        self.get_list("users", &query).await
    }

    /// Get a user by ID or login
    pub async fn get_user(&self, user_id: &str) -> Result<Value, AppError> {
        self.make_api_request(&format!("users/{}", encode(user_id)), Method::GET, None, &[])
            .await
    }

    /// Create a user
    ///
    /// # Arguments
    /// * `profile` - Profile object (`firstName`, `lastName`, `email`, `login`, ...)
    /// * `credentials` - Optional credentials object (e.g. `{"password": {"value": ...}}`)
    /// * `activate` - Whether to activate the user immediately
    pub async fn create_user(
        &self,
        profile: Value,
        credentials: Option<Value>,
        activate: bool,
    ) -> Result<Value, AppError> {
        let mut body = json!({ "profile": profile });
        if let Some(credentials) = credentials {
            body["credentials"] = credentials;
        }
        self.make_api_request(
            "users",
            Method::POST,
            Some(&body),
            &[("activate", activate.to_string())],
        )
        .await
    }

    /// Replace a user's profile and/or credentials
    pub async fn update_user(
        &self,
        user_id: &str,
        profile: Option<Value>,
        credentials: Option<Value>,
    ) -> Result<Value, AppError> {
        let mut body = json!({});
        if let Some(profile) = profile {
            body["profile"] = profile;
        }
        if let Some(credentials) = credentials {
            body["credentials"] = credentials;
        }
        self.make_api_request(&format!("users/{}", encode(user_id)), Method::PUT, Some(&body), &[])
            .await
    }

    /// Deactivate a user
    pub async fn deactivate_user(&self, user_id: &str) -> Result<(), AppError> {
        self.make_api_request(
            &format!("users/{}/lifecycle/deactivate", encode(user_id)),
            Method::POST,
            None,
            &[],
        )
        .await?;
        Ok(())
    }

    /// Delete a (deactivated) user
    pub async fn delete_user(&self, user_id: &str) -> Result<(), AppError> {
        self.make_api_request(&format!("users/{}", encode(user_id)), Method::DELETE, None, &[])
            .await?;
        Ok(())
    }

    /// List applications, optionally filtered
    pub async fn list_applications(&self, filter: Option<&str>) -> Result<Vec<Value>, AppError> {
        let query: Vec<(&str, String)> = filter
            .map(|f| vec![("filter", f.to_string())])
            .unwrap_or_default();
        self.get_list("apps", &query).await
    }

    /// Get an application by ID
    pub async fn get_application(&self, app_id: &str) -> Result<Value, AppError> {
        self.make_api_request(&format!("apps/{}", encode(app_id)), Method::GET, None, &[])
            .await
    }

    /// List users assigned to an application
    pub async fn list_application_users(&self, app_id: &str) -> Result<Vec<Value>, AppError> {
        self.get_list(&format!("apps/{}/users", encode(app_id)), &[]).await
    }

    /// Assign a user to an application
    pub async fn assign_user_to_application(
        &self,
        app_id: &str,
        user_id: &str,
        profile: Option<Value>,
    ) -> Result<Value, AppError> {
        let mut body = json!({ "id": user_id });
        if let Some(profile) = profile {
            body["profile"] = profile;
        }
        self.make_api_request(
            &format!("apps/{}/users", encode(app_id)),
            Method::POST,
            Some(&body),
            &[],
        )
        .await
    }

    /// Mint an access token with an application's own OAuth client
    ///
    /// Reads `credentials.oauthClient` from the application, runs the
    /// client-credentials grant on the default authorization server, tags the
    /// result with the user and application, and stores it.
    pub async fn generate_token_for_user(
        &self,
        user_id: &str,
        app_id: &str,
    ) -> Result<TokenRecord, AppError> {
        let app = self.get_application(app_id).await?;
        let oauth_client = &app["credentials"]["oauthClient"];
        let (Some(client_id), Some(client_secret)) = (
            oauth_client["client_id"].as_str(),
            oauth_client["client_secret"].as_str(),
        ) else {
            return Err(AppError::InvalidInput(
                "Application is not configured for OAuth".to_string(),
            ));
        };

        let mut record = client_credentials_token(
            &self.org_url,
            client_id,
            client_secret,
            &[CLIENT_CREDENTIALS_SCOPE],
        )
        .await?;
        record.user_id = Some(user_id.to_string());
        record.app_id = Some(app_id.to_string());
        self.store.save_oauth(&record)?;
        tracing::info!(user_id = %user_id, app_id = %app_id, "Generated token for user");
        Ok(record)
    }
}
