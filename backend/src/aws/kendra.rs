//! Amazon Kendra client (AWS JSON 1.1 protocol)

use crate::aws::credentials::AwsCredentials;
use crate::aws::signing::{send_signed_json, AwsSigner};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const SERVICE: &str = "kendra";
const CONTENT_TYPE: &str = "application/x-amz-json-1.1";
const TARGET_PREFIX: &str = "AWSKendraFrontendService";

/// Text with optional highlights
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TextWithHighlights {
    /// Plain text
    #[serde(default)]
    pub text: Option<String>,
}

/// Confidence bucket of a result
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KendraScoreAttributes {
    /// `VERY_HIGH`, `HIGH`, `MEDIUM`, `LOW` or `NOT_AVAILABLE`
    #[serde(default)]
    pub score_confidence: Option<String>,
}

/// One item of a query response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryResultItem {
    /// Result ID
    #[serde(default)]
    pub id: Option<String>,
    /// `DOCUMENT`, `QUESTION_ANSWER` or `ANSWER`
    #[serde(default, rename = "Type")]
    pub result_type: Option<String>,
    /// Document title
    #[serde(default)]
    pub document_title: Option<TextWithHighlights>,
    /// Document URI
    #[serde(default, rename = "DocumentURI")]
    pub document_uri: Option<String>,
    /// Matching excerpt
    #[serde(default)]
    pub document_excerpt: Option<TextWithHighlights>,
    /// Confidence bucket
    #[serde(default)]
    pub score_attributes: Option<KendraScoreAttributes>,
    /// Answer-specific attributes, passed through
    #[serde(default)]
    pub additional_attributes: Option<Value>,
}

/// Query response
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct QueryResponse {
    /// Query ID
    #[serde(default)]
    pub query_id: Option<String>,
    /// Results
    #[serde(default)]
    pub result_items: Vec<QueryResultItem>,
    /// Total number of matches
    #[serde(default)]
    pub total_number_of_results: u64,
}

/// Index listing entry
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct IndexSummary {
    /// Index ID
    #[serde(default)]
    pub id: Option<String>,
    /// Index name
    #[serde(default)]
    pub name: Option<String>,
    /// Lifecycle status
    #[serde(default)]
    pub status: Option<String>,
    /// Creation time, seconds since the epoch
    #[serde(default)]
    pub created_at: Option<f64>,
    /// Last update, seconds since the epoch
    #[serde(default)]
    pub updated_at: Option<f64>,
    /// `DEVELOPER_EDITION`, `ENTERPRISE_EDITION`, ...
    #[serde(default)]
    pub edition: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListIndicesPage {
    #[serde(default)]
    index_configuration_summary_items: Vec<IndexSummary>,
    #[serde(default)]
    next_token: Option<String>,
}

/// Flattened result as handed to tool callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KendraResult {
    /// Result ID
    pub id: Option<String>,
    /// Result type
    #[serde(rename = "type")]
    pub result_type: Option<String>,
    /// Title text, empty when absent
    pub document_title: String,
    /// URI, empty when absent
    pub document_uri: String,
    /// Confidence bucket, empty when absent
    pub score: String,
    /// Excerpt text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
    /// Answer-specific attributes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_attributes: Option<Value>,
}

impl From<QueryResultItem> for KendraResult {
    fn from(item: QueryResultItem) -> Self {
        Self {
            id: item.id,
            result_type: item.result_type,
            document_title: item
                .document_title
                .and_then(|t| t.text)
                .unwrap_or_default(),
            document_uri: item.document_uri.unwrap_or_default(),
            score: item
                .score_attributes
                .and_then(|s| s.score_confidence)
                .unwrap_or_default(),
            excerpt: item.document_excerpt.and_then(|e| e.text),
            additional_attributes: item.additional_attributes,
        }
    }
}

impl IndexSummary {
    /// Creation time as RFC 3339
    pub fn created_at_rfc3339(&self) -> Option<String> {
        self.created_at.and_then(epoch_to_rfc3339)
    }

    /// Update time as RFC 3339
    pub fn updated_at_rfc3339(&self) -> Option<String> {
        self.updated_at.and_then(epoch_to_rfc3339)
    }
}

fn epoch_to_rfc3339(seconds: f64) -> Option<String> {
    let whole = seconds.trunc() as i64;
    let nanos = ((seconds - seconds.trunc()) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(whole, nanos).map(|t| t.to_rfc3339())
}

/// Kendra client for one region
#[derive(Debug, Clone)]
pub struct KendraClient {
    http: reqwest::Client,
    signer: AwsSigner,
    endpoint: String,
}

impl KendraClient {
    /// Create a client for the regional endpoint
    pub fn new(region: &str, credentials: AwsCredentials, http: reqwest::Client) -> Self {
        Self {
            http,
            endpoint: format!("https://kendra.{}.amazonaws.com/", region),
            signer: AwsSigner::new(credentials, region, SERVICE),
        }
    }

    /// Point the client at another endpoint (used by tests)
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Region requests are signed for
    pub fn region(&self) -> &str {
        self.signer.region()
    }

    async fn call(&self, operation: &str, body: &Value) -> Result<Value, AppError> {
        let target = format!("{}.{}", TARGET_PREFIX, operation);
        tracing::debug!(target_op = %target, "Calling Kendra");
        send_signed_json(
            &self.http,
            &self.signer,
            Method::POST,
            &self.endpoint,
            CONTENT_TYPE,
            &[("x-amz-target", target.as_str())],
            Some(body),
        )
        .await
    }

    /// Run a free-text query against an index
    pub async fn query(&self, index_id: &str, query_text: &str) -> Result<QueryResponse, AppError> {
        let body = json!({ "IndexId": index_id, "QueryText": query_text });
        let response: QueryResponse = serde_json::from_value(self.call("Query", &body).await?)?;
        tracing::info!(
            index_id = %index_id,
            results = response.result_items.len(),
            total = response.total_number_of_results,
            "Kendra query completed"
        );
        Ok(response)
    }

    /// List every index in the region, following `NextToken`
    pub async fn list_indices(&self) -> Result<Vec<IndexSummary>, AppError> {
        let mut indexes = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let body = match &next_token {
                Some(token) => json!({ "NextToken": token }),
                None => json!({}),
            };
            let page: ListIndicesPage =
                serde_json::from_value(self.call("ListIndices", &body).await?)?;
            indexes.extend(page.index_configuration_summary_items);
            match page.next_token {
                Some(token) if !token.is_empty() => next_token = Some(token),
                _ => break,
            }
        }
        Ok(indexes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn client(url: &str) -> KendraClient {
        KendraClient::new(
            "us-west-2",
            AwsCredentials::new("AKID", "SECRET", None),
            reqwest::Client::new(),
        )
        .with_endpoint(format!("{}/", url))
    }

    #[tokio::test]
    async fn test_query_sends_target_and_maps_results() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/")
            .match_header("x-amz-target", "AWSKendraFrontendService.Query")
            .match_header("content-type", CONTENT_TYPE)
            .match_header("authorization", Matcher::Regex("kendra/aws4_request".to_string()))
            .match_body(Matcher::Json(json!({"IndexId": "idx", "QueryText": "vpn"})))
            .with_status(200)
            .with_body(
                r#"{"ResultItems":[{"Id":"r1","Type":"DOCUMENT","DocumentTitle":{"Text":"VPN guide"},
                "DocumentURI":"https://wiki/vpn","ScoreAttributes":{"ScoreConfidence":"HIGH"},
                "DocumentExcerpt":{"Text":"Connect with..."}}],"TotalNumberOfResults":1}"#,
            )
            .create_async()
            .await;

        let response = client(&server.url()).query("idx", "vpn").await.unwrap();
        mock.assert_async().await;
        assert_eq!(response.total_number_of_results, 1);

        let result = KendraResult::from(response.result_items[0].clone());
        assert_eq!(result.document_title, "VPN guide");
        assert_eq!(result.score, "HIGH");
        assert_eq!(result.excerpt.as_deref(), Some("Connect with..."));
        assert!(result.additional_attributes.is_none());
    }

    #[tokio::test]
    async fn test_list_indices_follows_next_token() {
        let mut server = Server::new_async().await;
        let first = server
            .mock("POST", "/")
            .match_header("x-amz-target", "AWSKendraFrontendService.ListIndices")
            .match_body(Matcher::Json(json!({})))
            .with_status(200)
            .with_body(r#"{"IndexConfigurationSummaryItems":[{"Id":"i1","Name":"one","CreatedAt":1700000000.5}],"NextToken":"t2"}"#)
            .create_async()
            .await;
        let second = server
            .mock("POST", "/")
            .match_body(Matcher::Json(json!({"NextToken": "t2"})))
            .with_status(200)
            .with_body(r#"{"IndexConfigurationSummaryItems":[{"Id":"i2","Name":"two"}]}"#)
            .create_async()
            .await;

        let indexes = client(&server.url()).list_indices().await.unwrap();
        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(indexes.len(), 2);
        assert_eq!(indexes[1].id.as_deref(), Some("i2"));
        assert!(indexes[0]
            .created_at_rfc3339()
            .unwrap()
            .starts_with("2023-11-14T22:13:20"));
        assert!(indexes[1].created_at_rfc3339().is_none());
    }
}
