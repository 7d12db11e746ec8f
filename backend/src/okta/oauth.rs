//! Okta OAuth 2.0 / OpenID Connect client
//!
//! Authorization-code (+ PKCE), refresh-token and client-credentials grants
//! go through the `oauth2` crate. Revocation, introspection and userinfo are
//! plain form/bearer calls against the same authorization server.

use crate::config::OktaConfig;
use crate::error::AppError;
use crate::state::{TokenKind, TokenRecord, TokenStore};
use chrono::Utc;
use oauth2::basic::{
    BasicErrorResponse, BasicRevocationErrorResponse, BasicTokenIntrospectionResponse,
    BasicTokenType,
};
use oauth2::reqwest::async_http_client;
use oauth2::{
    AuthUrl, AuthorizationCode, Client, ClientId, ClientSecret, CsrfToken, ExtraTokenFields,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken, RequestTokenError, Scope,
    StandardRevocableToken, StandardTokenResponse, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Scope requested for management-API tokens minted with client credentials
pub const CLIENT_CREDENTIALS_SCOPE: &str = "okta.users.read";

/// Extra fields Okta returns from its token endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OktaTokenFields {
    /// OIDC ID token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
}

impl ExtraTokenFields for OktaTokenFields {}

/// Token endpoint response carrying the ID token
pub type OktaTokenResponse = StandardTokenResponse<OktaTokenFields, BasicTokenType>;

type OktaOAuth2Client = Client<
    BasicErrorResponse,
    OktaTokenResponse,
    BasicTokenType,
    BasicTokenIntrospectionResponse,
    StandardRevocableToken,
    BasicRevocationErrorResponse,
>;

/// A PKCE code verifier and its S256 challenge
#[derive(Debug, Clone)]
pub struct PkcePair {
    /// `code_challenge` sent on the authorize request
    pub challenge: String,
    /// `code_verifier` sent on the token request
    pub verifier: String,
}

/// Endpoints of one Okta authorization server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthEndpoints {
    /// Issuer, `{org}/oauth2/{server}`
    pub issuer: String,
    /// Authorization endpoint
    pub authorize: String,
    /// Token endpoint
    pub token: String,
    /// Revocation endpoint
    pub revoke: String,
    /// Introspection endpoint
    pub introspect: String,
    /// Userinfo endpoint
    pub userinfo: String,
}

impl OAuthEndpoints {
    /// Build the endpoint set for `server` on `org_url`
    pub fn new(org_url: &str, server: &str) -> Self {
        let issuer = format!("{}/oauth2/{}", org_url.trim_end_matches('/'), server);
        Self {
            authorize: format!("{}/v1/authorize", issuer),
            token: format!("{}/v1/token", issuer),
            revoke: format!("{}/v1/revoke", issuer),
            introspect: format!("{}/v1/introspect", issuer),
            userinfo: format!("{}/v1/userinfo", issuer),
            issuer,
        }
    }
}

/// OAuth/OIDC client for one Okta application
#[derive(Debug, Clone)]
pub struct OktaOAuthClient {
    client: OktaOAuth2Client,
    http: reqwest::Client,
    org_url: String,
    client_id: String,
    client_secret: Option<String>,
    scopes: Vec<String>,
    endpoints: OAuthEndpoints,
    store: TokenStore,
}

impl OktaOAuthClient {
    /// Create a client from configuration
    ///
    /// # Arguments
    /// * `config` - Okta settings (org URL, client, redirect URI, scopes)
    /// * `store` - Where tokens are persisted after each exchange
    /// * `http` - Shared HTTP client for the hand-written calls
    ///
    /// # Returns
    /// * `Err(AppError::Config)` if an endpoint or the redirect URI is not a valid URL
    pub fn new(
        config: &OktaConfig,
        store: TokenStore,
        http: reqwest::Client,
    ) -> Result<Self, AppError> {
        let endpoints = OAuthEndpoints::new(&config.org_url, &config.authorization_server);

        let auth_url = AuthUrl::new(endpoints.authorize.clone())
            .map_err(|e| AppError::Config(format!("Invalid authorize URL: {}", e)))?;
        let token_url = TokenUrl::new(endpoints.token.clone())
            .map_err(|e| AppError::Config(format!("Invalid token URL: {}", e)))?;
        let redirect_url = RedirectUrl::new(config.redirect_uri.clone())
            .map_err(|e| AppError::Config(format!("Invalid redirect URI: {}", e)))?;

        // Without a secret the crate sends client_id in the form body (public client)
        let client = OktaOAuth2Client::new(
            ClientId::new(config.client_id.clone()),
            config.client_secret.clone().map(ClientSecret::new),
            auth_url,
            Some(token_url),
        )
        .set_redirect_uri(redirect_url);

        Ok(Self {
            client,
            http,
            org_url: config.org_url.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            scopes: config.scopes.clone(),
            endpoints,
            store,
        })
    }

    /// Endpoints this client talks to
    pub fn endpoints(&self) -> &OAuthEndpoints {
        &self.endpoints
    }

    /// Token store backing this client
    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    /// Generate a fresh PKCE verifier and its S256 challenge
    pub fn generate_pkce_pair() -> PkcePair {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        PkcePair {
            challenge: challenge.as_str().to_string(),
            verifier: verifier.secret().to_string(),
        }
    }

    /// Build the authorization URL the user is sent to
    ///
    /// # Arguments
    /// * `state` - Anti-CSRF state; a random one is generated when `None`
    /// * `pkce_challenge` - S256 code challenge, if PKCE is used
    ///
    /// # Returns
    /// * `(url, state)` - The URL and the state it carries
    pub fn authorization_url(
        &self,
        state: Option<String>,
        pkce_challenge: Option<&str>,
    ) -> (String, String) {
        let csrf = match state {
            Some(s) => CsrfToken::new(s),
            None => CsrfToken::new_random(),
        };

        let mut request = self
            .client
            .authorize_url(move || csrf)
            .add_scopes(self.scopes.iter().cloned().map(Scope::new));

        if let Some(challenge) = pkce_challenge {
            request = request
                .add_extra_param("code_challenge", challenge.to_string())
                .add_extra_param("code_challenge_method", "S256");
        }

        let (url, state) = request.url();
        (url.to_string(), state.secret().to_string())
    }

    /// Exchange an authorization code for tokens and store them
    ///
    /// # Arguments
    /// * `code` - Code returned to the redirect URI
    /// * `code_verifier` - PKCE verifier matching the challenge, if one was sent
    pub async fn exchange_code_for_tokens(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<TokenRecord, AppError> {
        let mut request = self
            .client
            .exchange_code(AuthorizationCode::new(code.to_string()));
        if let Some(verifier) = code_verifier {
            request = request.set_pkce_verifier(PkceCodeVerifier::new(verifier.to_string()));
        }

        tracing::debug!(
            token_url = %self.endpoints.token,
            pkce = code_verifier.is_some(),
            "Exchanging authorization code"
        );

        let response = request
            .request_async(async_http_client)
            .await
            .map_err(token_error)?;

        let record = record_from_response(&response, Utc::now().timestamp());
        self.store.save_oauth(&record)?;
        tracing::info!(
            has_id_token = record.id_token.is_some(),
            has_refresh_token = record.refresh_token.is_some(),
            "Stored tokens from authorization code exchange"
        );
        Ok(record)
    }

    /// Refresh the stored tokens
    ///
    /// The previous refresh token is kept when the server does not rotate it.
    ///
    /// # Errors
    /// * `AppError::NoRefreshToken` if nothing refreshable is stored
    pub async fn refresh_tokens(&self) -> Result<TokenRecord, AppError> {
        let previous = self
            .store
            .load_oauth()?
            .and_then(|r| r.refresh_token)
            .ok_or(AppError::NoRefreshToken)?;

        let response = self
            .client
            .exchange_refresh_token(&RefreshToken::new(previous.clone()))
            .add_scopes(self.scopes.iter().cloned().map(Scope::new))
            .request_async(async_http_client)
            .await
            .map_err(token_error)?;

        let mut record = record_from_response(&response, Utc::now().timestamp());
        if record.refresh_token.is_none() {
            record.refresh_token = Some(previous);
        }
        self.store.save_oauth(&record)?;
        tracing::info!("Refreshed OAuth tokens");
        Ok(record)
    }

    /// Revoke the stored token and delete the token file
    ///
    /// The access token is revoked when present, otherwise the refresh token.
    /// With nothing stored this succeeds without a network call.
    pub async fn revoke_tokens(&self) -> Result<(), AppError> {
        let Some(record) = self.store.load_oauth()? else {
            self.store.clear()?;
            return Ok(());
        };

        let (token, kind) = if !record.access_token.is_empty() {
            (record.access_token.clone(), TokenKind::Access)
        } else if let Some(refresh) = record.refresh_token.clone() {
            (refresh, TokenKind::Refresh)
        } else {
            self.store.clear()?;
            return Ok(());
        };

        let form = [
            ("token", token.as_str()),
            ("token_type_hint", kind.as_hint()),
        ];
        self.post_form(&self.endpoints.revoke, &form).await?;
        self.store.clear()?;
        tracing::info!(token_type_hint = kind.as_hint(), "Revoked token");
        Ok(())
    }

    /// Ask the authorization server whether a token is active
    pub async fn introspect_token(&self, token: &str, kind: TokenKind) -> Result<Value, AppError> {
        let form = [("token", token), ("token_type_hint", kind.as_hint())];
        let body = self.post_form(&self.endpoints.introspect, &form).await?;
        parse_json_body(&body)
    }

    /// Fetch the signed-in user's claims
    pub async fn get_userinfo(&self) -> Result<Value, AppError> {
        let access_token = self.valid_access_token().await?;
        let response = self
            .http
            .get(&self.endpoints.userinfo)
            .bearer_auth(access_token)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let body = read_success_body(response).await?;
        parse_json_body(&body)
    }

    /// Return the requested stored token if it is still valid
    ///
    /// An invalid or expired token triggers one refresh attempt when a
    /// refresh token is stored.
    pub async fn get_token(&self, kind: TokenKind) -> Result<Option<String>, AppError> {
        let Some(record) = self.store.load_oauth()? else {
            return Ok(None);
        };

        if record.is_valid(kind) {
            return Ok(record.get(kind).map(str::to_string));
        }

        if record.refresh_token.is_none() {
            return Ok(None);
        }

        tracing::debug!(kind = kind.as_hint(), "Stored token stale, refreshing");
        let refreshed = self.refresh_tokens().await?;
        Ok(refreshed.get(kind).map(str::to_string))
    }

    /// A valid access token, refreshing if needed
    pub async fn valid_access_token(&self) -> Result<String, AppError> {
        self.get_token(TokenKind::Access).await?.ok_or_else(|| {
            AppError::NotAuthenticated("no valid access token; log in first".to_string())
        })
    }

    /// Run the client-credentials grant against this org's default server
    ///
    /// # Arguments
    /// * `client_id` / `client_secret` - Credentials of the service application
    /// * `scopes` - Scopes to request
    pub async fn client_credentials_token(
        &self,
        client_id: &str,
        client_secret: &str,
        scopes: &[&str],
    ) -> Result<TokenRecord, AppError> {
        client_credentials_token(&self.org_url, client_id, client_secret, scopes).await
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String, AppError> {
        let mut params = form.to_vec();
        let mut request = self.http.post(url);
        match &self.client_secret {
            Some(secret) => request = request.basic_auth(&self.client_id, Some(secret)),
            None => params.push(("client_id", self.client_id.as_str())),
        }
        let response = request.form(&params).send().await?;
        read_success_body(response).await
    }
}

/// Client-credentials grant on `{org}/oauth2/default`
pub async fn client_credentials_token(
    org_url: &str,
    client_id: &str,
    client_secret: &str,
    scopes: &[&str],
) -> Result<TokenRecord, AppError> {
    let endpoints = OAuthEndpoints::new(org_url, "default");
    let auth_url = AuthUrl::new(endpoints.authorize)
        .map_err(|e| AppError::Config(format!("Invalid authorize URL: {}", e)))?;
    let token_url = TokenUrl::new(endpoints.token)
        .map_err(|e| AppError::Config(format!("Invalid token URL: {}", e)))?;

    let client = OktaOAuth2Client::new(
        ClientId::new(client_id.to_string()),
        Some(ClientSecret::new(client_secret.to_string())),
        auth_url,
        Some(token_url),
    );

    let response = client
        .exchange_client_credentials()
        .add_scopes(scopes.iter().map(|s| Scope::new(s.to_string())))
        .request_async(async_http_client)
        .await
        .map_err(token_error)?;

    Ok(record_from_response(&response, Utc::now().timestamp()))
}

fn record_from_response(response: &OktaTokenResponse, now: i64) -> TokenRecord {
    let mut record = TokenRecord::new(response.access_token().secret().clone());
    record.token_type = "Bearer".to_string();
    record.id_token = response.extra_fields().id_token.clone();
    record.refresh_token = response.refresh_token().map(|t| t.secret().clone());
    record.scope = response.scopes().map(|scopes| {
        scopes
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    });
    record.expires_in = response.expires_in().map(|d| d.as_secs());
    record.stamp_expiry(now);
    record
}

fn token_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> AppError
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => AppError::OAuth(response.to_string()),
        RequestTokenError::Parse(e, body) => AppError::Parse(format!(
            "{} - Response body: {}",
            e,
            String::from_utf8_lossy(&body)
        )),
        other => AppError::OAuth(other.to_string()),
    }
}

async fn read_success_body(response: reqwest::Response) -> Result<String, AppError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        tracing::error!(status_code = status.as_u16(), "Okta returned error status");
        return Err(AppError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

fn parse_json_body(body: &str) -> Result<Value, AppError> {
    if body.trim().is_empty() {
        return Ok(Value::Object(Default::default()));
    }
    Ok(serde_json::from_str(body)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use tempfile::TempDir;

    fn okta_config(org_url: &str, secret: Option<&str>) -> OktaConfig {
        OktaConfig {
            org_url: org_url.to_string(),
            api_token: "api".to_string(),
            client_id: "client123".to_string(),
            client_secret: secret.map(str::to_string),
            redirect_uri: "http://localhost:8080/authorization-code/callback".to_string(),
            scopes: vec!["openid".to_string(), "offline_access".to_string()],
            authorization_server: "default".to_string(),
        }
    }

    fn client(org_url: &str, secret: Option<&str>) -> (TempDir, OktaOAuthClient) {
        let dir = TempDir::new().unwrap();
        let store = TokenStore::new(dir.path().join("tokens.json"));
        let client =
            OktaOAuthClient::new(&okta_config(org_url, secret), store, reqwest::Client::new())
                .unwrap();
        (dir, client)
    }

    #[test]
    fn test_endpoints() {
        let endpoints = OAuthEndpoints::new("https://dev.okta.com/", "default");
        assert_eq!(endpoints.issuer, "https://dev.okta.com/oauth2/default");
        assert_eq!(
            endpoints.token,
            "https://dev.okta.com/oauth2/default/v1/token"
        );
    }

    #[test]
    fn test_authorization_url_parameters() {
        let (_dir, client) = client("https://dev.okta.com", None);
        let (url, state) = client.authorization_url(Some("abc".to_string()), Some("xyz"));
        let parsed = url::Url::parse(&url).unwrap();
        let params: std::collections::HashMap<_, _> = parsed.query_pairs().into_owned().collect();

        assert_eq!(state, "abc");
        assert_eq!(parsed.path(), "/oauth2/default/v1/authorize");
        assert_eq!(params["client_id"], "client123");
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["scope"], "openid offline_access");
        assert_eq!(params["state"], "abc");
        assert_eq!(params["code_challenge"], "xyz");
        assert_eq!(params["code_challenge_method"], "S256");
    }

    #[test]
    fn test_authorization_url_generates_state() {
        let (_dir, client) = client("https://dev.okta.com", None);
        let (url, state) = client.authorization_url(None, None);
        assert!(!state.is_empty());
        assert!(url.contains(&format!("state={}", state)));
        assert!(!url.contains("code_challenge"));
    }

    #[test]
    fn test_pkce_pair_is_s256_of_verifier() {
        let pair = OktaOAuthClient::generate_pkce_pair();
        let expected = PkceCodeChallenge::from_code_verifier_sha256(&PkceCodeVerifier::new(
            pair.verifier.clone(),
        ));
        assert_eq!(pair.challenge, expected.as_str());
    }

    #[tokio::test]
    async fn test_exchange_code_stores_tokens() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/default/v1/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "the-code".into()),
                Matcher::UrlEncoded("code_verifier".into(), "verifier".into()),
                Matcher::UrlEncoded("client_id".into(), "client123".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"access_token":"at","token_type":"Bearer","expires_in":3600,
                    "refresh_token":"rt","id_token":"idt","scope":"openid offline_access"}"#,
            )
            .create_async()
            .await;

        let (_dir, client) = client(&server.url(), None);
        let record = client
            .exchange_code_for_tokens("the-code", Some("verifier"))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(record.access_token, "at");
        assert_eq!(record.id_token.as_deref(), Some("idt"));
        assert!(record.expires_at.is_some());
        assert_eq!(client.store().load_oauth().unwrap(), Some(record));
    }

    #[tokio::test]
    async fn test_exchange_code_error_is_oauth_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/default/v1/token")
            .with_status(400)
            .with_header("content-type", "application/json")
            .with_body(r#"{"error":"invalid_grant","error_description":"bad code"}"#)
            .create_async()
            .await;

        let (_dir, client) = client(&server.url(), Some("secret"));
        let err = client
            .exchange_code_for_tokens("bad", None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::OAuth(ref msg) if msg.contains("invalid_grant")));
        assert!(client.store().load().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_refresh_keeps_previous_refresh_token() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/default/v1/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
                Matcher::UrlEncoded("refresh_token".into(), "old-rt".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"new-at","token_type":"Bearer","expires_in":3600}"#)
            .create_async()
            .await;

        let (_dir, client) = client(&server.url(), Some("secret"));
        let mut stored = TokenRecord::new("old-at");
        stored.refresh_token = Some("old-rt".to_string());
        client.store().save_oauth(&stored).unwrap();

        let record = client.refresh_tokens().await.unwrap();
        mock.assert_async().await;
        assert_eq!(record.access_token, "new-at");
        assert_eq!(record.refresh_token.as_deref(), Some("old-rt"));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token() {
        let (_dir, client) = client("https://dev.okta.com", None);
        client
            .store()
            .save_oauth(&TokenRecord::new("at"))
            .unwrap();
        assert!(matches!(
            client.refresh_tokens().await,
            Err(AppError::NoRefreshToken)
        ));
    }

    #[tokio::test]
    async fn test_revoke_clears_token_file() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/oauth2/default/v1/revoke")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("token".into(), "at".into()),
                Matcher::UrlEncoded("token_type_hint".into(), "access_token".into()),
            ]))
            .with_status(200)
            .create_async()
            .await;

        let (_dir, client) = client(&server.url(), Some("secret"));
        client.store().save_oauth(&TokenRecord::new("at")).unwrap();

        client.revoke_tokens().await.unwrap();
        mock.assert_async().await;
        assert!(!client.store().path().exists());
    }

    #[tokio::test]
    async fn test_revoke_with_nothing_stored() {
        let (_dir, client) = client("http://127.0.0.1:1", None);
        assert!(client.revoke_tokens().await.is_ok());
    }

    #[tokio::test]
    async fn test_get_token_refreshes_expired_record() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/default/v1/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"fresh","token_type":"Bearer","expires_in":3600}"#)
            .create_async()
            .await;

        let (_dir, client) = client(&server.url(), Some("secret"));
        let mut stale = TokenRecord::new("stale");
        stale.refresh_token = Some("rt".to_string());
        stale.expires_at = Some(Utc::now().timestamp() + 30);
        client.store().save_oauth(&stale).unwrap();

        let token = client.get_token(TokenKind::Access).await.unwrap();
        assert_eq!(token.as_deref(), Some("fresh"));
    }

    #[tokio::test]
    async fn test_introspect_token() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/oauth2/default/v1/introspect")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"active":true,"sub":"user@example.com"}"#)
            .create_async()
            .await;

        let (_dir, client) = client(&server.url(), Some("secret"));
        let result = client
            .introspect_token("at", TokenKind::Access)
            .await
            .unwrap();
        assert_eq!(result["active"], true);
    }
}
