//! MCP servers for Amazon Q Business and Kendra
//!
//! Two servers share the tool handlers in [`tools`]; each exposes its own
//! tool set through an `rmcp` [`rmcp::ServerHandler`] and is served over
//! stdio or HTTP by [`transport`].

pub mod clients;
pub mod kendra_server;
pub mod qbusiness_server;
pub mod tools;
pub mod transport;

pub use clients::AwsClientFactory;
pub use kendra_server::KendraMcpServer;
pub use qbusiness_server::QBusinessMcpServer;
pub use transport::TransportArgs;

use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use rmcp::ErrorData as McpError;
use schemars::{schema_for, JsonSchema};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;

/// JSON schema of a tool's argument struct
pub(crate) fn to_schema<T: JsonSchema>() -> Result<Arc<JsonObject>, McpError> {
    let schema = schema_for!(T);
    let value = serde_json::to_value(schema).map_err(|e| {
        McpError::internal_error(format!("Failed to serialize schema: {}", e), None)
    })?;
    let object = value
        .as_object()
        .ok_or_else(|| McpError::internal_error("Schema is not a JSON object", None))?
        .clone();
    Ok(Arc::new(object))
}

/// Tool descriptor for argument type `T`
pub(crate) fn tool<T: JsonSchema>(name: &'static str, description: &'static str) -> Result<Tool, McpError> {
    Ok(Tool {
        name: name.into(),
        title: None,
        description: Some(description.into()),
        input_schema: to_schema::<T>()?,
        output_schema: None,
        annotations: None,
        icons: None,
    })
}

/// Decode tool arguments
pub(crate) fn parse_args<T: DeserializeOwned>(arguments: Option<JsonObject>) -> Result<T, McpError> {
    let value = Value::Object(arguments.unwrap_or_default());
    serde_json::from_value(value)
        .map_err(|e| McpError::invalid_params(format!("Invalid arguments: {}", e), None))
}

/// Wrap a tool payload as pretty-printed JSON text
pub(crate) fn json_result(payload: Value) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(&payload).map_err(|e| {
        McpError::internal_error(format!("Failed to serialize result: {}", e), None)
    })?;
    Ok(CallToolResult::success(vec![Content::text(text)]))
}
