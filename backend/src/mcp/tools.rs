//! MCP tool arguments and handlers
//!
//! Every handler returns a JSON payload. Failures are reported inside the
//! payload as `{error, ...inputs}` so the calling model sees what went wrong.

use crate::aws::kendra::KendraResult;
use crate::aws::qbusiness_types::{AuthChallengeResponse, ChatMode, ChatSyncRequest};
use crate::error::AppError;
use crate::mcp::clients::AwsClientFactory;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

/// Name of the Q Business application listing tool
pub const QBUSINESS_LIST_APPLICATIONS: &str = "QBusinessListApplicationsTool";
/// Name of the Q Business search tool
pub const QBUSINESS_SEARCH_RELEVANT_CONTENT: &str = "QBusinessSearchRelevantContentTool";
/// Name of the Q Business ChatSync tool
pub const QBUSINESS_CHAT_SYNC: &str = "QBusinessChatSyncTool";
/// Name of the Kendra index listing tool
pub const KENDRA_LIST_INDEXES: &str = "KendraListIndexesTool";
/// Name of the Kendra query tool
pub const KENDRA_QUERY: &str = "KendraQueryTool";

/// Arguments of [`QBUSINESS_LIST_APPLICATIONS`]
#[derive(Debug, Default, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ListApplicationsArgs {
    /// AWS region of the applications
    #[serde(default)]
    pub region: Option<String>,
    /// Maximum number of applications to return
    #[serde(default)]
    pub max_results: Option<u32>,
    /// Token from a previous call
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Arguments of [`QBUSINESS_SEARCH_RELEVANT_CONTENT`]
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SearchRelevantContentArgs {
    /// Text to search for
    pub query_text: String,
    /// Application to search
    pub application_id: String,
    /// Retriever used as the content source
    pub retriever_id: String,
    /// AWS region of the application
    #[serde(default)]
    pub region: Option<String>,
    /// Maximum number of results
    #[serde(default)]
    pub max_results: Option<u32>,
    /// Token from a previous call
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Arguments of [`QBUSINESS_CHAT_SYNC`]
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChatSyncArgs {
    /// Message to send
    pub user_message: String,
    /// AWS region of the application
    #[serde(default)]
    pub region: Option<String>,
    /// Existing conversation to continue
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Attribution token from a previous answer
    #[serde(default)]
    pub attribution_token: Option<String>,
}

/// Arguments of [`KENDRA_LIST_INDEXES`]
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct ListIndexesArgs {
    /// AWS region to list indexes in
    #[serde(default)]
    pub region: Option<String>,
}

/// Arguments of [`KENDRA_QUERY`]
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KendraQueryArgs {
    /// Search query
    pub query: String,
    /// AWS region of the index
    #[serde(default)]
    pub region: Option<String>,
    /// Index to query; `KENDRA_INDEX_ID` when omitted
    #[serde(default)]
    pub index_id: Option<String>,
}

fn error_payload(error: &AppError, echo: Value) -> Value {
    tracing::warn!(error = %error, "Tool call failed");
    let mut payload = Map::new();
    payload.insert("error".to_string(), Value::String(error.to_string()));
    if let Value::Object(fields) = echo {
        payload.extend(fields);
    }
    Value::Object(payload)
}

/// List applications with their retrievers
pub async fn list_applications(factory: &AwsClientFactory, args: ListApplicationsArgs) -> Value {
    let region = factory.region(args.region.as_deref());
    match try_list_applications(factory, &region, &args).await {
        Ok(payload) => payload,
        Err(e) => error_payload(&e, json!({ "region": region })),
    }
}

async fn try_list_applications(
    factory: &AwsClientFactory,
    region: &str,
    args: &ListApplicationsArgs,
) -> Result<Value, AppError> {
    let client = factory.qbusiness(region)?;
    let page = client
        .list_applications(args.max_results, args.next_token.as_deref())
        .await?;

    let mut applications = Vec::with_capacity(page.applications.len());
    for app in page.applications {
        let mut info = json!({
            "applicationId": app.application_id,
            "name": app.name,
            "description": app.description,
        });

        let Some(app_id) = app.application_id.as_deref() else {
            applications.push(info);
            continue;
        };
        match client.list_retrievers(app_id).await {
            Ok(listing) => {
                let retrievers: Vec<Value> = listing
                    .retrievers
                    .into_iter()
                    .map(|r| {
                        json!({
                            "retrieverId": r.retriever_id,
                            "name": r.name,
                            "type": r.retriever_type,
                        })
                    })
                    .collect();
                info["retrievers"] = Value::Array(retrievers);
            }
            Err(e) => {
                tracing::warn!(application_id = %app_id, error = %e, "Listing retrievers failed");
                info["retrievers_error"] = Value::String(e.to_string());
            }
        }
        applications.push(info);
    }

    Ok(json!({
        "region": region,
        "count": applications.len(),
        "applications": applications,
        "nextToken": page.next_token,
    }))
}

/// Search an application's retriever
pub async fn search_relevant_content(
    factory: &AwsClientFactory,
    args: SearchRelevantContentArgs,
) -> Value {
    match try_search_relevant_content(factory, &args).await {
        Ok(payload) => payload,
        Err(e) => error_payload(
            &e,
            json!({
                "query": args.query_text,
                "applicationId": args.application_id,
                "retrieverId": args.retriever_id,
            }),
        ),
    }
}

async fn try_search_relevant_content(
    factory: &AwsClientFactory,
    args: &SearchRelevantContentArgs,
) -> Result<Value, AppError> {
    let region = factory.region(args.region.as_deref());
    let client = factory.identity_aware_qbusiness(&region).await?;
    let response = client
        .search_relevant_content(
            &args.application_id,
            &args.retriever_id,
            &args.query_text,
            args.max_results,
            args.next_token.as_deref(),
        )
        .await?;

    let results: Vec<Value> = response
        .relevant_content
        .into_iter()
        .map(|item| {
            let mut entry = json!({
                "content": item.content,
                "documentId": item.document_id,
                "documentTitle": item.document_title,
                "documentUri": item.document_uri,
                "scoreConfidence": item.score_attributes.and_then(|s| s.score_confidence),
            });
            if !item.document_attributes.is_empty() {
                entry["documentAttributes"] = item
                    .document_attributes
                    .into_iter()
                    .map(|a| json!({ "name": a.name, "value": a.value }))
                    .collect();
            }
            entry
        })
        .collect();

    Ok(json!({
        "query": args.query_text,
        "applicationId": args.application_id,
        "retrieverId": args.retriever_id,
        "nextToken": response.next_token,
        "results": results,
    }))
}

/// Build the ChatSync request for the configured application and plugin
pub fn chat_sync_request(factory: &AwsClientFactory, args: &ChatSyncArgs) -> ChatSyncRequest {
    let mcp = &factory.config().mcp;
    let mut request = ChatSyncRequest::message(args.user_message.clone());
    request.conversation_id = args.conversation_id.clone();
    request.attribution_token = args.attribution_token.clone();

    if let Some(plugin_id) = &mcp.plugin_id {
        request = request.with_plugin(plugin_id.clone());
    } else {
        request.chat_mode = Some(ChatMode::RetrievalMode);
    }

    let mut response_map = HashMap::new();
    if let Some(token) = &mcp.plugin_access_token {
        response_map.insert("access_token".to_string(), token.clone());
    }
    if let Some(url) = &mcp.plugin_instance_url {
        response_map.insert("instance_url".to_string(), url.clone());
    }
    if !response_map.is_empty() {
        request.auth_challenge_response = Some(AuthChallengeResponse { response_map });
    }
    request
}

/// Send one message through ChatSync
pub async fn chat_sync(factory: &AwsClientFactory, args: ChatSyncArgs) -> Value {
    match try_chat_sync(factory, &args).await {
        Ok(payload) => payload,
        Err(e) => error_payload(
            &e,
            json!({
                "applicationId": factory.config().aws.q_application_id,
                "userMessage": args.user_message,
                "pluginId": factory.config().mcp.plugin_id,
            }),
        ),
    }
}

async fn try_chat_sync(factory: &AwsClientFactory, args: &ChatSyncArgs) -> Result<Value, AppError> {
    let region = factory.region(args.region.as_deref());
    let client = factory.identity_aware_qbusiness(&region).await?;
    let request = chat_sync_request(factory, args);
    let response = client.chat_sync_with(&request).await?;

    let mut payload = json!({
        "conversationId": response.conversation_id,
        "systemMessage": response.system_message,
        "userMessage": args.user_message,
        "attributionToken": response.attribution_token,
    });
    if let Some(plugin) = response.plugin_result {
        payload["pluginResult"] = json!({
            "pluginId": plugin.plugin_id,
            "status": plugin.status,
            "body": plugin.body,
        });
    }
    if !response.source_attributions.is_empty() {
        payload["citations"] = response
            .source_attributions
            .into_iter()
            .map(|c| json!({ "title": c.title, "url": c.url, "snippet": c.snippet }))
            .collect();
    }
    Ok(payload)
}

/// List every Kendra index in a region
pub async fn kendra_list_indexes(factory: &AwsClientFactory, args: ListIndexesArgs) -> Value {
    let region = factory.region(args.region.as_deref());
    match try_kendra_list_indexes(factory, &region).await {
        Ok(payload) => payload,
        Err(e) => error_payload(&e, json!({ "region": region })),
    }
}

async fn try_kendra_list_indexes(
    factory: &AwsClientFactory,
    region: &str,
) -> Result<Value, AppError> {
    let indexes: Vec<Value> = factory
        .kendra(region)?
        .list_indices()
        .await?
        .into_iter()
        .map(|index| {
            json!({
                "id": index.id,
                "name": index.name,
                "status": index.status,
                "created_at": index.created_at_rfc3339(),
                "updated_at": index.updated_at_rfc3339(),
                "edition": index.edition,
            })
        })
        .collect();

    Ok(json!({
        "region": region,
        "count": indexes.len(),
        "indexes": indexes,
    }))
}

/// Query a Kendra index
pub async fn kendra_query(factory: &AwsClientFactory, args: KendraQueryArgs) -> Value {
    let index_id = args
        .index_id
        .clone()
        .or_else(|| factory.config().aws.kendra_index_id.clone());
    match try_kendra_query(factory, &args, index_id.as_deref()).await {
        Ok(payload) => payload,
        Err(e) => error_payload(&e, json!({ "query": args.query, "index_id": index_id })),
    }
}

async fn try_kendra_query(
    factory: &AwsClientFactory,
    args: &KendraQueryArgs,
    index_id: Option<&str>,
) -> Result<Value, AppError> {
    let region = factory.region(args.region.as_deref());
    let client = factory.kendra(&region)?;
    let index_id = index_id.ok_or_else(|| {
        AppError::InvalidInput("KENDRA_INDEX_ID environment variable is not set.".to_string())
    })?;

    let response = client.query(index_id, &args.query).await?;
    let results: Vec<KendraResult> = response
        .result_items
        .into_iter()
        .map(KendraResult::from)
        .collect();

    Ok(json!({
        "query": args.query,
        "total_results_count": response.total_number_of_results,
        "results": results,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::AwsCredentials;
    use crate::config::Config;

    fn factory(config: Config) -> AwsClientFactory {
        AwsClientFactory::new(config)
            .unwrap()
            .with_credentials(AwsCredentials::new("AKID", "SECRET", None))
    }

    #[test]
    fn test_args_use_camel_case() {
        let args: SearchRelevantContentArgs = serde_json::from_value(json!({
            "queryText": "q",
            "applicationId": "a",
            "retrieverId": "r",
            "maxResults": 2
        }))
        .unwrap();
        assert_eq!(args.max_results, Some(2));
        assert!(args.region.is_none());
    }

    #[test]
    fn test_chat_request_uses_configured_plugin() {
        let mut config = Config::default();
        config.mcp.plugin_id = Some("plugin-9".to_string());
        config.mcp.plugin_access_token = Some("tok".to_string());
        config.mcp.plugin_instance_url = None;

        let request = chat_sync_request(
            &factory(config),
            &ChatSyncArgs {
                user_message: "hi".to_string(),
                region: None,
                conversation_id: Some("c1".to_string()),
                attribution_token: None,
            },
        );
        assert_eq!(request.chat_mode, Some(ChatMode::PluginMode));
        assert_eq!(
            request
                .chat_mode_configuration
                .as_ref()
                .map(|c| c.plugin_configuration.plugin_id.as_str()),
            Some("plugin-9")
        );
        let map = request.auth_challenge_response.unwrap().response_map;
        assert_eq!(map.get("access_token").map(String::as_str), Some("tok"));
        assert!(!map.contains_key("instance_url"));
    }

    #[test]
    fn test_chat_request_without_plugin_is_retrieval() {
        let mut config = Config::default();
        config.mcp = Default::default();
        let request = chat_sync_request(
            &factory(config),
            &ChatSyncArgs {
                user_message: "hi".to_string(),
                region: None,
                conversation_id: None,
                attribution_token: Some("attr".to_string()),
            },
        );
        assert_eq!(request.chat_mode, Some(ChatMode::RetrievalMode));
        assert!(request.auth_challenge_response.is_none());
        assert_eq!(request.attribution_token.as_deref(), Some("attr"));
    }

    #[tokio::test]
    async fn test_kendra_query_without_index_reports_error() {
        let mut config = Config::default();
        config.aws.kendra_index_id = None;

        let payload = kendra_query(
            &factory(config),
            KendraQueryArgs {
                query: "vpn".to_string(),
                region: Some("us-west-2".to_string()),
                index_id: None,
            },
        )
        .await;
        assert_eq!(payload["query"], "vpn");
        assert!(payload["index_id"].is_null());
        assert!(payload["error"]
            .as_str()
            .unwrap()
            .contains("KENDRA_INDEX_ID environment variable is not set."));
    }

    #[tokio::test]
    async fn test_chat_without_application_reports_error() {
        let mut config = Config::default();
        config.aws.q_application_id = None;
        config.mcp.plugin_id = Some("p".to_string());

        let payload = chat_sync(
            &factory(config),
            ChatSyncArgs {
                user_message: "hello".to_string(),
                region: None,
                conversation_id: None,
                attribution_token: None,
            },
        )
        .await;
        assert!(payload["error"]
            .as_str()
            .unwrap()
            .contains("application ID must be provided"));
        assert_eq!(payload["userMessage"], "hello");
        assert_eq!(payload["pluginId"], "p");
    }
}
