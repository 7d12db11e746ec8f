//! Chat transcript models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    /// Message typed by the user
    User,
    /// Answer from Amazon Q Business
    Assistant,
}

impl MessageRole {
    /// Convert the role to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// One transcript entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Who sent it
    pub role: MessageRole,
    /// Text as sent or rendered
    pub content: String,
    /// Conversation the message belongs to, once the service assigned one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// When it was recorded (Unix timestamp)
    pub created_at: i64,
}

impl Message {
    /// Create a message stamped with the current time
    pub fn new(role: MessageRole, content: impl Into<String>, conversation_id: Option<String>) -> Self {
        Self {
            role,
            content: content.into(),
            conversation_id,
            created_at: Utc::now().timestamp(),
        }
    }

    /// Get created_at as DateTime
    pub fn created_at_datetime(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.created_at, 0).unwrap_or_else(Utc::now)
    }
}
