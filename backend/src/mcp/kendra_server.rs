//! Amazon Kendra MCP server

use crate::mcp::clients::AwsClientFactory;
use crate::mcp::tools::{self, KendraQueryArgs, ListIndexesArgs, KENDRA_LIST_INDEXES, KENDRA_QUERY};
use crate::mcp::{json_result, parse_args, tool};
use rmcp::model::*;
use rmcp::service::{RequestContext, RoleServer};
use rmcp::ErrorData as McpError;
use rmcp::ServerHandler;

const INSTRUCTIONS: &str = "Query an Amazon Kendra index with the user's search query, using \
    the index ID the user gives or the configured default index, or list the indexes in a region.";

/// Server exposing the Kendra tools
#[derive(Debug, Clone)]
pub struct KendraMcpServer {
    factory: AwsClientFactory,
}

impl KendraMcpServer {
    /// Create a server whose tools build clients with `factory`
    pub fn new(factory: AwsClientFactory) -> Self {
        Self { factory }
    }

    /// Tools this server offers
    pub fn tools() -> Result<Vec<Tool>, McpError> {
        Ok(vec![
            tool::<ListIndexesArgs>(
                KENDRA_LIST_INDEXES,
                "List all Amazon Kendra indexes in a region.",
            )?,
            tool::<KendraQueryArgs>(
                KENDRA_QUERY,
                "Query an Amazon Kendra index and return the matching results. The index is \
                 the one given, or the default index from the environment.",
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
            KENDRA_LIST_INDEXES => {
                tools::kendra_list_indexes(&self.factory, parse_args(arguments)?).await
            }
            KENDRA_QUERY => tools::kendra_query(&self.factory, parse_args(arguments)?).await,
            _ => return Err(McpError::method_not_found::<CallToolRequestMethod>()),
        };
        json_result(payload)
    }
}

impl ServerHandler for KendraMcpServer {
    fn get_info(&self) -> InitializeResult {
        InitializeResult {
            protocol_version: ProtocolVersion::V_2025_03_26,
            server_info: Implementation {
                name: "kendra-mcp-server".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: Some("Amazon Kendra MCP Server".into()),
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
    use mockito::{Matcher, Server};
    use serde_json::{json, Value};

    fn server(config: Config, endpoint: String) -> KendraMcpServer {
        let factory = AwsClientFactory::new(config)
            .unwrap()
            .with_credentials(AwsCredentials::new("AKID", "SECRET", None))
            .with_kendra_endpoint(endpoint);
        KendraMcpServer::new(factory)
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

    #[tokio::test]
    async fn test_query_falls_back_to_configured_index() {
        let mut mock_server = Server::new_async().await;
        let _query = mock_server
            .mock("POST", "/")
            .match_header("x-amz-target", "AWSKendraFrontendService.Query")
            .match_body(Matcher::PartialJson(json!({"IndexId": "default-idx"})))
            .with_status(200)
            .with_body(r#"{"ResultItems":[{"Id":"r1","Type":"ANSWER","AdditionalAttributes":[{"Key":"AnswerText"}]}],"TotalNumberOfResults":1}"#)
            .create_async()
            .await;

        let mut config = Config::default();
        config.aws.kendra_index_id = Some("default-idx".to_string());
        let args = json!({"query": "holidays"}).as_object().cloned();

        let result = server(config, format!("{}/", mock_server.url()))
            .dispatch(KENDRA_QUERY, args)
            .await
            .unwrap();
        let body = payload(result);
        assert_eq!(body["total_results_count"], 1);
        assert_eq!(body["results"][0]["type"], "ANSWER");
        assert_eq!(body["results"][0]["document_title"], "");
        assert!(body["results"][0]["additional_attributes"].is_array());
        assert!(body["results"][0].get("excerpt").is_none());
    }

    #[tokio::test]
    async fn test_list_indexes_error_payload_echoes_region() {
        let mut mock_server = Server::new_async().await;
        let _list = mock_server
            .mock("POST", "/")
            .with_status(400)
            .with_body(r#"{"__type":"AccessDeniedException"}"#)
            .create_async()
            .await;

        let args = json!({"region": "ap-southeast-2"}).as_object().cloned();
        let result = server(Config::default(), format!("{}/", mock_server.url()))
            .dispatch(KENDRA_LIST_INDEXES, args)
            .await
            .unwrap();
        let body = payload(result);
        assert_eq!(body["region"], "ap-southeast-2");
        assert!(body["error"].as_str().unwrap().contains("AccessDeniedException"));
    }

    #[test]
    fn test_tools_listed() {
        let tools = KendraMcpServer::tools().unwrap();
        assert_eq!(tools.len(), 2);
        assert!(tools[1].input_schema["properties"].get("indexId").is_some());
    }
}
