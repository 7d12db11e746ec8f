//! Amazon Q Business request and response types
//!
//! Structs that mirror the Q Business REST JSON shapes. Fields the
//! toolkit does not interpret are kept in `extra` maps so callers can still
//! print the full response.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Chat mode of a ChatSync request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChatMode {
    /// Answer from the application's indexed content
    RetrievalMode,
    /// Answer from the model alone
    CreatorMode,
    /// Route the message to a plugin
    PluginMode,
}

/// Plugin selection for [`ChatMode::PluginMode`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfiguration {
    /// Plugin ID
    pub plugin_id: String,
}

/// Mode-specific configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatModeConfiguration {
    /// Plugin to use
    pub plugin_configuration: PluginConfiguration,
}

/// Answer to a plugin's authentication challenge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthChallengeResponse {
    /// Key/value pairs handed to the plugin (`access_token`, `instance_url`, ...)
    pub response_map: HashMap<String, String>,
}

/// Body of a ChatSync call
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSyncRequest {
    /// Message text
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_message: Option<String>,
    /// Conversation to continue
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Last system message of the conversation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
    /// Chat mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_mode: Option<ChatMode>,
    /// Plugin selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_mode_configuration: Option<ChatModeConfiguration>,
    /// Answer to an auth challenge
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_challenge_response: Option<AuthChallengeResponse>,
    /// Attribution token from a previous answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribution_token: Option<String>,
}

impl ChatSyncRequest {
    /// Plain retrieval message
    pub fn message(text: impl Into<String>) -> Self {
        Self {
            user_message: Some(text.into()),
            ..Default::default()
        }
    }

    /// Route the request to `plugin_id`
    pub fn with_plugin(mut self, plugin_id: impl Into<String>) -> Self {
        self.chat_mode = Some(ChatMode::PluginMode);
        self.chat_mode_configuration = Some(ChatModeConfiguration {
            plugin_configuration: PluginConfiguration {
                plugin_id: plugin_id.into(),
            },
        });
        self
    }
}

/// A source the answer was drawn from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceAttribution {
    /// Document title
    #[serde(default)]
    pub title: Option<String>,
    /// Excerpt used
    #[serde(default)]
    pub snippet: Option<String>,
    /// Document URL
    #[serde(default)]
    pub url: Option<String>,
    /// Citation marker number in the answer text
    #[serde(default)]
    pub citation_number: Option<u32>,
}

/// Result of a plugin invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginResult {
    /// Plugin that ran
    #[serde(default)]
    pub plugin_id: Option<String>,
    /// Outcome reported by the plugin
    #[serde(default)]
    pub status: Option<String>,
    /// Plugin payload
    #[serde(default)]
    pub body: Option<Value>,
}

/// ChatSync response
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSyncResponse {
    /// Conversation the message belongs to
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Answer text
    #[serde(default)]
    pub system_message: Option<String>,
    /// ID of the answer, used as the next parent message
    #[serde(default)]
    pub system_message_id: Option<String>,
    /// ID assigned to the user message
    #[serde(default)]
    pub user_message_id: Option<String>,
    /// Sources cited by the answer
    #[serde(default)]
    pub source_attributions: Vec<SourceAttribution>,
    /// Plugin outcome for plugin-mode requests
    #[serde(default)]
    pub plugin_result: Option<PluginResult>,
    /// Attribution token for follow-ups
    #[serde(default)]
    pub attribution_token: Option<String>,
    /// Everything else the service returned
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Page of applications
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListApplicationsResponse {
    /// Applications on this page
    #[serde(default)]
    pub applications: Vec<ApplicationSummary>,
    /// Token for the next page
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Application listing entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSummary {
    /// Application ID
    #[serde(default)]
    pub application_id: Option<String>,
    /// Display name
    #[serde(default, alias = "displayName")]
    pub name: Option<String>,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
    /// Lifecycle status
    #[serde(default)]
    pub status: Option<String>,
}

/// Page of retrievers
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRetrieversResponse {
    /// Retrievers
    #[serde(default)]
    pub retrievers: Vec<Retriever>,
    /// Token for the next page
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Retriever attached to an application
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retriever {
    /// Retriever ID
    #[serde(default)]
    pub retriever_id: Option<String>,
    /// Display name
    #[serde(default, alias = "displayName")]
    pub name: Option<String>,
    /// `NATIVE_INDEX` or `KENDRA_INDEX`
    #[serde(default, rename = "type")]
    pub retriever_type: Option<String>,
    /// Lifecycle status
    #[serde(default)]
    pub status: Option<String>,
}

/// Page of search results
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRelevantContentResponse {
    /// Matching content
    #[serde(default)]
    pub relevant_content: Vec<RelevantContent>,
    /// Token for the next page
    #[serde(default)]
    pub next_token: Option<String>,
}

/// Scoring information for a search hit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreAttributes {
    /// `VERY_HIGH` .. `LOW`, or `NOT_AVAILABLE`
    #[serde(default)]
    pub score_confidence: Option<String>,
}

/// Attribute attached to a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAttribute {
    /// Attribute name
    pub name: String,
    /// Typed attribute value, passed through untouched
    #[serde(default)]
    pub value: Value,
}

/// One search hit
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelevantContent {
    /// Matched passage
    #[serde(default)]
    pub content: Option<String>,
    /// Source document ID
    #[serde(default)]
    pub document_id: Option<String>,
    /// Source document title
    #[serde(default)]
    pub document_title: Option<String>,
    /// Source document URI
    #[serde(default)]
    pub document_uri: Option<String>,
    /// Scoring information
    #[serde(default)]
    pub score_attributes: Option<ScoreAttributes>,
    /// Document attributes
    #[serde(default)]
    pub document_attributes: Vec<DocumentAttribute>,
}

/// Conversation threading state carried between ChatSync calls
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationState {
    /// Current conversation
    pub conversation_id: Option<String>,
    /// Last system message, sent as the next parent message
    pub parent_message_id: Option<String>,
}

impl ConversationState {
    /// Take the IDs a ChatSync response hands back
    pub fn update_from(&mut self, response: &ChatSyncResponse) {
        if let Some(id) = &response.conversation_id {
            self.conversation_id = Some(id.clone());
        }
        if let Some(id) = &response.system_message_id {
            self.parent_message_id = Some(id.clone());
        }
    }

    /// Forget the current conversation
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_plugin_request_shape() {
        let mut request = ChatSyncRequest::message("open cases").with_plugin("plug-1");
        request.auth_challenge_response = Some(AuthChallengeResponse {
            response_map: HashMap::from([("access_token".to_string(), "tok".to_string())]),
        });

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "userMessage": "open cases",
                "chatMode": "PLUGIN_MODE",
                "chatModeConfiguration": {"pluginConfiguration": {"pluginId": "plug-1"}},
                "authChallengeResponse": {"responseMap": {"access_token": "tok"}}
            })
        );
    }

    #[test]
    fn test_response_keeps_unknown_fields() {
        let response: ChatSyncResponse = serde_json::from_value(json!({
            "conversationId": "c1",
            "systemMessage": "hello",
            "systemMessageId": "s1",
            "sourceAttributions": [{"title": "Doc", "url": "https://d", "citationNumber": 1}],
            "failedAttachments": []
        }))
        .unwrap();

        assert_eq!(response.source_attributions.len(), 1);
        assert_eq!(response.source_attributions[0].citation_number, Some(1));
        assert!(response.extra.contains_key("failedAttachments"));
    }

    #[test]
    fn test_conversation_state_threading() {
        let mut state = ConversationState::default();
        state.update_from(&ChatSyncResponse {
            conversation_id: Some("c1".into()),
            system_message_id: Some("s1".into()),
            ..Default::default()
        });
        state.update_from(&ChatSyncResponse {
            system_message_id: Some("s2".into()),
            ..Default::default()
        });
        assert_eq!(state.conversation_id.as_deref(), Some("c1"));
        assert_eq!(state.parent_message_id.as_deref(), Some("s2"));

        state.reset();
        assert_eq!(state, ConversationState::default());
    }

    #[test]
    fn test_retriever_type_field() {
        let retriever: Retriever = serde_json::from_value(json!({
            "retrieverId": "r1",
            "displayName": "Index",
            "type": "NATIVE_INDEX"
        }))
        .unwrap();
        assert_eq!(retriever.name.as_deref(), Some("Index"));
        assert_eq!(retriever.retriever_type.as_deref(), Some("NATIVE_INDEX"));
    }
}
