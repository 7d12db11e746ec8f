//! Amazon Q Business client
//!
//! SigV4-signed calls against the Q Business REST API. Conversation calls
//! need an application and a user; listing and search calls take the
//! application explicitly.

use crate::aws::credentials::AwsCredentials;
use crate::aws::qbusiness_types::{
    ChatSyncRequest, ChatSyncResponse, ConversationState, ListApplicationsResponse,
    ListRetrieversResponse, SearchRelevantContentResponse,
};
use crate::aws::signing::{send_signed_json, AwsSigner};
use crate::config::AwsConfig;
use crate::error::AppError;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use urlencoding::encode;
use uuid::Uuid;

const SERVICE: &str = "qbusiness";
const CONTENT_TYPE: &str = "application/json";

/// Client settings
#[derive(Debug, Clone, Default)]
pub struct QBusinessSettings {
    /// Region of the application
    pub region: String,
    /// Application used by conversation calls
    pub application_id: Option<String>,
    /// User the conversation belongs to
    pub user_id: Option<String>,
}

impl QBusinessSettings {
    /// Settings from the AWS section of the configuration
    pub fn from_config(aws: &AwsConfig) -> Self {
        Self {
            region: aws.region.clone().unwrap_or_default(),
            application_id: aws.q_application_id.clone(),
            user_id: aws.user_id.clone(),
        }
    }
}

/// Amazon Q Business client with conversation state
#[derive(Debug, Clone)]
pub struct QBusinessClient {
    http: reqwest::Client,
    signer: AwsSigner,
    endpoint: String,
    application_id: Option<String>,
    user_id: Option<String>,
    conversation: ConversationState,
}

impl QBusinessClient {
    /// Create a client for the regional endpoint
    ///
    /// # Errors
    /// * `AppError::Config` - Region missing
    pub fn new(
        settings: QBusinessSettings,
        credentials: AwsCredentials,
        http: reqwest::Client,
    ) -> Result<Self, AppError> {
        let region = settings.region.trim().to_string();
        if region.is_empty() {
            return Err(AppError::Config("AWS region must be provided".to_string()));
        }

        Ok(Self {
            http,
            endpoint: format!("https://qbusiness.{}.api.aws", region),
            signer: AwsSigner::new(credentials, region, SERVICE),
            application_id: settings.application_id.filter(|a| !a.trim().is_empty()),
            user_id: settings.user_id.filter(|u| !u.trim().is_empty()),
            conversation: ConversationState::default(),
        })
    }

    /// Point the client at another endpoint (used by tests)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Region requests are signed for
    pub fn region(&self) -> &str {
        self.signer.region()
    }

    /// Current conversation threading state
    pub fn conversation(&self) -> &ConversationState {
        &self.conversation
    }

    /// Drop the current conversation so the next message starts a new one
    pub fn reset_conversation(&mut self) {
        self.conversation.reset();
    }

    fn require_application(&self) -> Result<&str, AppError> {
        self.application_id.as_deref().ok_or_else(|| {
            AppError::Config("Amazon Q Business application ID must be provided".to_string())
        })
    }

    fn require_user(&self) -> Result<&str, AppError> {
        self.user_id
            .as_deref()
            .ok_or_else(|| AppError::Config("User ID must be provided".to_string()))
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<T, AppError> {
        let url = format!("{}{}", self.endpoint, path);
        let value = send_signed_json(
            &self.http,
            &self.signer,
            method,
            &url,
            CONTENT_TYPE,
            &[],
            body,
        )
        .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Start a conversation under a client-generated ID
    pub async fn start_conversation(&mut self) -> Result<Value, AppError> {
        let application_id = self.require_application()?.to_string();
        let user_id = self.require_user()?.to_string();
        let conversation_id = Uuid::new_v4().to_string();

        let path = format!(
            "/applications/{}/conversations/{}",
            encode(&application_id),
            conversation_id
        );
        let body = json!({ "userId": user_id });

        tracing::info!(conversation_id = %conversation_id, "Starting Q Business conversation");
        let response = self.request(Method::PUT, &path, Some(&body)).await?;
        self.conversation = ConversationState {
            conversation_id: Some(conversation_id),
            parent_message_id: None,
        };
        Ok(response)
    }

    /// Post a message, starting a conversation first if there is none
    pub async fn send_message(&mut self, text: &str) -> Result<Value, AppError> {
        if self.conversation.conversation_id.is_none() {
            self.start_conversation().await?;
        }
        let application_id = self.require_application()?.to_string();
        let conversation_id = self
            .conversation
            .conversation_id
            .clone()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("conversation was not started")))?;
        let message_id = Uuid::new_v4().to_string();

        let path = format!(
            "/applications/{}/conversations/{}/messages/{}",
            encode(&application_id),
            encode(&conversation_id),
            message_id
        );
        let body = json!({ "content": { "text": text } });

        tracing::debug!(
            conversation_id = %conversation_id,
            message_id = %message_id,
            message_len = text.len(),
            "Sending Q Business message"
        );
        self.request(Method::PUT, &path, Some(&body)).await
    }

    /// Ask a question in the current conversation and wait for the answer
    ///
    /// The conversation and parent message IDs from the answer are kept for
    /// the next call.
    pub async fn chat_sync(&mut self, text: &str) -> Result<ChatSyncResponse, AppError> {
        self.require_user()?;
        let request = ChatSyncRequest {
            user_message: Some(text.to_string()),
            conversation_id: self.conversation.conversation_id.clone(),
            parent_message_id: self.conversation.parent_message_id.clone(),
            ..Default::default()
        };

        let response = self.chat_sync_with(&request).await?;
        self.conversation.update_from(&response);
        Ok(response)
    }

    /// Send an arbitrary ChatSync request to the configured application
    pub async fn chat_sync_with(
        &self,
        request: &ChatSyncRequest,
    ) -> Result<ChatSyncResponse, AppError> {
        let application_id = self.require_application()?;
        let mut path = format!("/applications/{}/conversations?sync", encode(application_id));
        if let Some(user_id) = &self.user_id {
            path.push_str(&format!("&userId={}", encode(user_id)));
        }
        let body = serde_json::to_value(request)?;

        tracing::debug!(
            application_id = %application_id,
            conversation_id = ?request.conversation_id,
            chat_mode = ?request.chat_mode,
            "Calling Q Business ChatSync"
        );
        let response: ChatSyncResponse = self.request(Method::POST, &path, Some(&body)).await?;
        tracing::info!(
            conversation_id = ?response.conversation_id,
            attributions = response.source_attributions.len(),
            "ChatSync answered"
        );
        Ok(response)
    }

    /// List applications in the region
    pub async fn list_applications(
        &self,
        max_results: Option<u32>,
        next_token: Option<&str>,
    ) -> Result<ListApplicationsResponse, AppError> {
        let mut query = Vec::new();
        if let Some(max) = max_results {
            query.push(format!("maxResults={}", max));
        }
        if let Some(token) = next_token {
            query.push(format!("nextToken={}", encode(token)));
        }
        let path = if query.is_empty() {
            "/applications".to_string()
        } else {
            format!("/applications?{}", query.join("&"))
        };
        self.request(Method::GET, &path, None).await
    }

    /// List the retrievers of an application
    pub async fn list_retrievers(
        &self,
        application_id: &str,
    ) -> Result<ListRetrieversResponse, AppError> {
        let path = format!("/applications/{}/retrievers", encode(application_id));
        self.request(Method::GET, &path, None).await
    }

    /// Search an application's retriever for content relevant to `query_text`
    pub async fn search_relevant_content(
        &self,
        application_id: &str,
        retriever_id: &str,
        query_text: &str,
        max_results: Option<u32>,
        next_token: Option<&str>,
    ) -> Result<SearchRelevantContentResponse, AppError> {
        let path = format!("/applications/{}/relevant-content", encode(application_id));
        let mut body = json!({
            "queryText": query_text,
            "contentSource": { "retriever": { "retrieverId": retriever_id } }
        });
        if let Some(max) = max_results {
            body["maxResults"] = json!(max);
        }
        if let Some(token) = next_token {
            body["nextToken"] = json!(token);
        }
        self.request(Method::POST, &path, Some(&body)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client(endpoint: &str, app: Option<&str>, user: Option<&str>) -> QBusinessClient {
        QBusinessClient::new(
            QBusinessSettings {
                region: "us-east-1".to_string(),
                application_id: app.map(String::from),
                user_id: user.map(String::from),
            },
            AwsCredentials::new("AKID", "SECRET", None),
            reqwest::Client::new(),
        )
        .unwrap()
        .with_endpoint(endpoint)
    }

    #[test]
    fn test_region_required() {
        let err = QBusinessClient::new(
            QBusinessSettings::default(),
            AwsCredentials::new("a", "b", None),
            reqwest::Client::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("AWS region must be provided"));
    }

    #[tokio::test]
    async fn test_conversation_calls_need_application() {
        let mut q = client("http://127.0.0.1:9", None, Some("u"));
        let err = q.chat_sync("hi").await.unwrap_err();
        assert!(err
            .to_string()
            .contains("Amazon Q Business application ID must be provided"));

        let mut q = client("http://127.0.0.1:9", Some("app"), None);
        let err = q.start_conversation().await.unwrap_err();
        assert!(err.to_string().contains("User ID must be provided"));
    }

    #[tokio::test]
    async fn test_chat_sync_threads_conversation() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("POST", "/applications/app-1/conversations")
            .match_query(Matcher::AllOf(vec![
                Matcher::Regex("sync".to_string()),
                Matcher::UrlEncoded("userId".into(), "alice".into()),
            ]))
            .match_header("authorization", Matcher::Regex("^AWS4-HMAC-SHA256 ".to_string()))
            .match_header("x-amz-date", Matcher::Any)
            .match_body(Matcher::Json(json!({"userMessage": "hello"})))
            .with_status(200)
            .with_body(r#"{"conversationId":"c-1","systemMessage":"hi","systemMessageId":"s-1"}"#)
            .create_async()
            .await;

        let mut q = client(&server.url(), Some("app-1"), Some("alice"));
        let response = q.chat_sync("hello").await.unwrap();
        first.assert_async().await;
        assert_eq!(response.system_message.as_deref(), Some("hi"));

        let second = server
            .mock("POST", "/applications/app-1/conversations")
            .match_query(Matcher::Any)
            .match_body(Matcher::Json(json!({
                "userMessage": "again",
                "conversationId": "c-1",
                "parentMessageId": "s-1"
            })))
            .with_status(200)
            .with_body(r#"{"conversationId":"c-1","systemMessageId":"s-2"}"#)
            .create_async()
            .await;

        q.chat_sync("again").await.unwrap();
        second.assert_async().await;
        assert_eq!(q.conversation().parent_message_id.as_deref(), Some("s-2"));
    }

    #[tokio::test]
    async fn test_send_message_starts_conversation() {
        let mut server = Server::new_async().await;
        let start = server
            .mock("PUT", Matcher::Regex("^/applications/app-1/conversations/[0-9a-f-]{36}$".to_string()))
            .match_body(Matcher::Json(json!({"userId": "alice"})))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;
        let message = server
            .mock(
                "PUT",
                Matcher::Regex("^/applications/app-1/conversations/[0-9a-f-]{36}/messages/[0-9a-f-]{36}$".to_string()),
            )
            .match_body(Matcher::Json(json!({"content": {"text": "hey"}})))
            .with_status(200)
            .with_body(r#"{"messageId":"m"}"#)
            .create_async()
            .await;

        let mut q = client(&server.url(), Some("app-1"), Some("alice"));
        q.send_message("hey").await.unwrap();
        start.assert_async().await;
        message.assert_async().await;
        assert!(q.conversation().conversation_id.is_some());
    }

    #[tokio::test]
    async fn test_failed_start_keeps_no_conversation() {
        let mut server = Server::new_async().await;
        let start = server
            .mock("PUT", Matcher::Regex("^/applications/app-1/conversations/[0-9a-f-]{36}$".to_string()))
            .with_status(500)
            .with_body(r#"{"message":"InternalServerException"}"#)
            .expect(2)
            .create_async()
            .await;

        let mut q = client(&server.url(), Some("app-1"), Some("alice"));
        let err = q.start_conversation().await.unwrap_err();
        assert_eq!(err.api_status(), Some(500));
        assert!(q.conversation().conversation_id.is_none());

        // The next message tries to start a conversation again
        assert!(q.send_message("hey").await.is_err());
        assert!(q.conversation().conversation_id.is_none());
        start.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_status_maps_to_api_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/applications")
            .with_status(403)
            .with_body(r#"{"message":"AccessDenied"}"#)
            .create_async()
            .await;

        let q = client(&server.url(), None, None);
        let err = q.list_applications(None, None).await.unwrap_err();
        assert_eq!(err.api_status(), Some(403));
    }

    #[tokio::test]
    async fn test_list_applications_and_search() {
        let mut server = Server::new_async().await;
        let _apps = server
            .mock("GET", "/applications")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("maxResults".into(), "5".into()),
                Matcher::UrlEncoded("nextToken".into(), "a/b=".into()),
            ]))
            .with_status(200)
            .with_body(r#"{"applications":[{"applicationId":"a1","displayName":"HR"}],"nextToken":"n2"}"#)
            .create_async()
            .await;
        let _search = server
            .mock("POST", "/applications/a1/relevant-content")
            .match_body(Matcher::PartialJson(json!({
                "queryText": "pto",
                "contentSource": {"retriever": {"retrieverId": "r1"}},
                "maxResults": 3
            })))
            .with_status(200)
            .with_body(r#"{"relevantContent":[{"content":"15 days","documentTitle":"Policy","scoreAttributes":{"scoreConfidence":"HIGH"}}]}"#)
            .create_async()
            .await;

        let q = client(&server.url(), None, None);
        let apps = q.list_applications(Some(5), Some("a/b=")).await.unwrap();
        assert_eq!(apps.applications[0].name.as_deref(), Some("HR"));
        assert_eq!(apps.next_token.as_deref(), Some("n2"));

        let hits = q
            .search_relevant_content("a1", "r1", "pto", Some(3), None)
            .await
            .unwrap();
        assert_eq!(hits.relevant_content[0].content.as_deref(), Some("15 days"));
    }
}
