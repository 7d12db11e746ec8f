//! Amazon Q Business MCP server

use crate::mcp::clients::AwsClientFactory;
use crate::mcp::tools::{
    self, ChatSyncArgs, ListApplicationsArgs, SearchRelevantContentArgs, QBUSINESS_CHAT_SYNC,
    QBUSINESS_LIST_APPLICATIONS, QBUSINESS_SEARCH_RELEVANT_CONTENT,
};
use crate::mcp::{json_result, parse_args, tool};
use rmcp::model::*;
use rmcp::service::{RequestContext, RoleServer};
use rmcp::ErrorData as McpError;
use rmcp::ServerHandler;

const INSTRUCTIONS: &str = "Query Amazon Q Business to help answer the user's prompt: list \
    applications and their retrievers, search an application for relevant content, or chat \
    through the configured application and plugin.";

/// Server exposing the Q Business tools
#[derive(Debug, Clone)]
pub struct QBusinessMcpServer {
    factory: AwsClientFactory,
}

impl QBusinessMcpServer {
    /// Create a server whose tools build clients with `factory`
    pub fn new(factory: AwsClientFactory) -> Self {
        Self { factory }
    }

    /// Tools this server offers
    pub fn tools() -> Result<Vec<Tool>, McpError> {
        Ok(vec![
            tool::<ListApplicationsArgs>(
                QBUSINESS_LIST_APPLICATIONS,
                "List the Amazon Q Business applications in the account with their IDs, \
                 names, descriptions and retrievers.",
            )?,
            tool::<SearchRelevantContentArgs>(
                QBUSINESS_SEARCH_RELEVANT_CONTENT,
                "Search an Amazon Q Business application's retriever for content relevant \
                 to a query.",
            )?,
            tool::<ChatSyncArgs>(
                QBUSINESS_CHAT_SYNC,
                "Send a message to the configured Amazon Q Business application through \
                 ChatSync and return the answer.",
            )?,
        ])
    }

    /// Run a tool by name
    pub async fn dispatch(
        &self,
        name: &str,
        arguments: Option<JsonObject>,
    ) -> Result<CallToolResult, McpError> {
        tracing::info!(tool = %name, "Tool called");
        let payload = match name {
            QBUSINESS_LIST_APPLICATIONS => {
                tools::list_applications(&self.factory, parse_args(arguments)?).await
            }
            QBUSINESS_SEARCH_RELEVANT_CONTENT => {
                tools::search_relevant_content(&self.factory, parse_args(arguments)?).await
            }
            QBUSINESS_CHAT_SYNC => tools::chat_sync(&self.factory, parse_args(arguments)?).await,
            _ => return Err(McpError::method_not_found::<CallToolRequestMethod>()),
        };
        json_result(payload)
    }
}

impl ServerHandler for QBusinessMcpServer {
    fn get_info(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: ProtocolVersion::V_2025_03_26,
            server_info: Implementation {
                name: "qbusiness-mcp-server".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: Some("Amazon Q Business MCP Server".into()),
                icons: None,
                website_url: None,
            },
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            instructions: Some(INSTRUCTIONS.into()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = Self::tools()?;
        tracing::info!("ListTools returning {} tools", tools.len());
        Ok(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        self.dispatch(&request.name, request.arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::AwsCredentials;
    use crate::config::Config;
    use mockito::Server;
    use serde_json::{json, Value};

    fn server(config: Config, endpoint: &str) -> QBusinessMcpServer {
        let factory = AwsClientFactory::new(config)
            .unwrap()
            .with_credentials(AwsCredentials::new("AKID", "SECRET", None))
            .with_qbusiness_endpoint(endpoint);
        QBusinessMcpServer::new(factory)
    }

    fn payload(result: CallToolResult) -> Value {
        let text = result
            .content
            .first()
            .and_then(|c| c.as_text())
            .map(|t| t.text.clone())
            .unwrap();
        serde_json::from_str(&text).unwrap()
    }

    #[test]
    fn test_tool_names_and_schemas() {
        let tools = QBusinessMcpServer::tools().unwrap();
        let names: Vec<&str> = tools.iter().map(|t| &*t.name).collect();
        assert_eq!(
            names,
            vec![
                QBUSINESS_LIST_APPLICATIONS,
                QBUSINESS_SEARCH_RELEVANT_CONTENT,
                QBUSINESS_CHAT_SYNC
            ]
        );
        let search = &tools[1].input_schema;
        assert!(search["properties"].get("queryText").is_some());
        assert!(search["required"]
            .as_array()
            .unwrap()
            .contains(&json!("retrieverId")));
    }

    #[test]
    fn test_info_enables_tools() {
        let info = server(Config::default(), "http://127.0.0.1:9").get_info();
        assert!(info.capabilities.tools.is_some());
        assert_eq!(info.server_info.name, "qbusiness-mcp-server");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let result = server(Config::default(), "http://127.0.0.1:9")
            .dispatch("NoSuchTool", None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_list_applications_reports_retriever_errors_per_app() {
        let mut mock_server = Server::new_async().await;
        let _apps = mock_server
            .mock("GET", "/applications")
            .with_status(200)
            .with_body(r#"{"applications":[{"applicationId":"a1","displayName":"HR"},{"applicationId":"a2","displayName":"IT"}]}"#)
            .create_async()
            .await;
        let _ok = mock_server
            .mock("GET", "/applications/a1/retrievers")
            .with_status(200)
            .with_body(r#"{"retrievers":[{"retrieverId":"r1","displayName":"idx","type":"NATIVE_INDEX"}]}"#)
            .create_async()
            .await;
        let _denied = mock_server
            .mock("GET", "/applications/a2/retrievers")
            .with_status(403)
            .with_body("denied")
            .create_async()
            .await;

        let mut config = Config::default();
        config.aws.region = Some("us-west-2".to_string());
        let result = server(config, &mock_server.url())
            .dispatch(QBUSINESS_LIST_APPLICATIONS, Some(JsonObject::new()))
            .await
            .unwrap();
        let body = payload(result);

        assert_eq!(body["region"], "us-west-2");
        assert_eq!(body["count"], 2);
        assert_eq!(body["applications"][0]["retrievers"][0]["type"], "NATIVE_INDEX");
        assert!(body["applications"][1]["retrievers_error"]
            .as_str()
            .unwrap()
            .contains("403"));
    }

    #[tokio::test]
    async fn test_list_applications_error_payload() {
        let mut mock_server = Server::new_async().await;
        let _apps = mock_server
            .mock("GET", "/applications")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let args = json!({"region": "eu-west-1"}).as_object().cloned();
        let result = server(Config::default(), &mock_server.url())
            .dispatch(QBUSINESS_LIST_APPLICATIONS, args)
            .await
            .unwrap();
        let body = payload(result);
        assert_eq!(body["region"], "eu-west-1");
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn test_chat_sync_returns_citations() {
        let mut mock_server = Server::new_async().await;
        let _chat = mock_server
            .mock("POST", "/applications/app-1/conversations")
            .match_query(mockito::Matcher::Regex("^sync$".to_string()))
            .with_status(200)
            .with_body(r#"{"conversationId":"c1","systemMessage":"Done","sourceAttributions":[{"title":"Case 42","url":"https://sf/42","snippet":"open"}]}"#)
            .create_async()
            .await;

        let mut config = Config::default();
        config.aws.q_application_id = Some("app-1".to_string());
        config.mcp.plugin_id = Some("plugin-1".to_string());
        let args = json!({"userMessage": "show case 42"}).as_object().cloned();

        let result = server(config, &mock_server.url())
            .dispatch(QBUSINESS_CHAT_SYNC, args)
            .await
            .unwrap();
        let body = payload(result);
        assert_eq!(body["conversationId"], "c1");
        assert_eq!(body["userMessage"], "show case 42");
        assert_eq!(body["citations"][0]["title"], "Case 42");
    }
}
