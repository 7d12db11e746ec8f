//! Interactive Amazon Q Business chat session
//!
//! Keeps the transcript and threads the conversation through ChatSync.

use crate::aws::qbusiness::QBusinessClient;
use crate::aws::qbusiness_types::{ChatSyncResponse, ConversationState};
use crate::chat::models::{Message, MessageRole};
use crate::error::AppError;

const EXIT_COMMANDS: [&str; 2] = ["exit", "quit"];

/// Whether a line typed at the prompt ends the session
pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    EXIT_COMMANDS.iter().any(|c| input.eq_ignore_ascii_case(c))
}

/// Text shown for an answer
///
/// The answer text when present, otherwise the whole response as JSON.
/// Source attributions are listed after it.
pub fn render_reply(response: &ChatSyncResponse) -> String {
    let mut out = match response.system_message.as_deref() {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => {
            let full = serde_json::to_string_pretty(response)
                .unwrap_or_else(|_| format!("{:?}", response));
            format!("No text response received\nFull response: {}", full)
        }
    };

    if !response.source_attributions.is_empty() {
        out.push_str("\n\nSources:");
        for (i, source) in response.source_attributions.iter().enumerate() {
            let number = source.citation_number.unwrap_or(i as u32 + 1);
            let title = source.title.as_deref().unwrap_or("untitled");
            out.push_str(&format!("\n  [{}] {}", number, title));
            if let Some(url) = &source.url {
                out.push_str(&format!(" - {}", url));
            }
        }
    }
    out
}

/// Chat session over one Q Business client
#[derive(Debug)]
pub struct ChatSession {
    client: QBusinessClient,
    transcript: Vec<Message>,
}

impl ChatSession {
    /// Wrap a configured client
    pub fn new(client: QBusinessClient) -> Self {
        Self {
            client,
            transcript: Vec::new(),
        }
    }

    /// Messages exchanged so far
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// Conversation threading state
    pub fn conversation(&self) -> &ConversationState {
        self.client.conversation()
    }

    /// Register a conversation before the first message
    pub async fn start(&mut self) -> Result<String, AppError> {
        self.client.start_conversation().await?;
        self.client
            .conversation()
            .conversation_id
            .clone()
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("conversation ID missing after start")))
    }

    /// Ask a question and wait for the answer
    ///
    /// # Errors
    /// * `AppError::InvalidInput` - Blank message
    pub async fn ask(&mut self, text: &str) -> Result<ChatSyncResponse, AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::InvalidInput("Message cannot be empty".to_string()));
        }

        let conversation_id = self.client.conversation().conversation_id.clone();
        let response = self.client.chat_sync(text).await?;
        self.transcript
            .push(Message::new(MessageRole::User, text, conversation_id));
        self.transcript.push(Message::new(
            MessageRole::Assistant,
            render_reply(&response),
            response.conversation_id.clone(),
        ));
        tracing::debug!(
            transcript_len = self.transcript.len(),
            conversation_id = ?response.conversation_id,
            "Recorded chat exchange"
        );
        Ok(response)
    }

    /// Post a message without waiting for an answer
    pub async fn send(&mut self, text: &str) -> Result<(), AppError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AppError::InvalidInput("Message cannot be empty".to_string()));
        }
        self.client.send_message(text).await?;
        let conversation_id = self.client.conversation().conversation_id.clone();
        self.transcript
            .push(Message::new(MessageRole::User, text, conversation_id));
        Ok(())
    }

    /// Forget the conversation and the transcript
    pub fn reset(&mut self) {
        self.client.reset_conversation();
        self.transcript.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::qbusiness::QBusinessSettings;
    use crate::aws::qbusiness_types::SourceAttribution;
    use crate::aws::AwsCredentials;
    use mockito::{Matcher, Server};

    #[test]
    fn test_exit_commands() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("  QUIT "));
        assert!(!is_exit_command("exit now"));
        assert!(!is_exit_command(""));
    }

    #[test]
    fn test_render_text_with_sources() {
        let response = ChatSyncResponse {
            system_message: Some("Use the VPN.".into()),
            source_attributions: vec![SourceAttribution {
                title: Some("IT FAQ".into()),
                url: Some("https://wiki/faq".into()),
                citation_number: Some(1),
                ..Default::default()
            }],
            ..Default::default()
        };
        let text = render_reply(&response);
        assert!(text.starts_with("Use the VPN."));
        assert!(text.contains("[1] IT FAQ - https://wiki/faq"));
    }

    #[test]
    fn test_render_without_text_dumps_response() {
        let response = ChatSyncResponse {
            conversation_id: Some("c1".into()),
            ..Default::default()
        };
        let text = render_reply(&response);
        assert!(text.starts_with("No text response received"));
        assert!(text.contains("\"conversationId\": \"c1\""));
    }

    fn session(url: &str) -> ChatSession {
        let client = QBusinessClient::new(
            QBusinessSettings {
                region: "us-east-1".into(),
                application_id: Some("app".into()),
                user_id: Some("u".into()),
            },
            AwsCredentials::new("a", "b", None),
            reqwest::Client::new(),
        )
        .unwrap()
        .with_endpoint(url);
        ChatSession::new(client)
    }

    #[tokio::test]
    async fn test_blank_message_rejected() {
        let mut chat = session("http://127.0.0.1:9");
        assert!(matches!(chat.ask("   ").await, Err(AppError::InvalidInput(_))));
        assert!(chat.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_failed_ask_leaves_transcript_unchanged() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/applications/app/conversations")
            .match_query(Matcher::Any)
            .with_status(500)
            .with_body(r#"{"message":"boom"}"#)
            .create_async()
            .await;

        let mut chat = session(&server.url());
        assert!(chat.ask("hi").await.is_err());
        assert!(chat.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_ask_records_transcript() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/applications/app/conversations")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"conversationId":"c9","systemMessage":"Hello!","systemMessageId":"s9"}"#)
            .create_async()
            .await;

        let mut chat = session(&server.url());
        chat.ask("  hi ").await.unwrap();

        let transcript = chat.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].content, "hi");
        assert_eq!(transcript[1].role, MessageRole::Assistant);
        assert_eq!(transcript[1].content, "Hello!");
        assert_eq!(chat.conversation().parent_message_id.as_deref(), Some("s9"));

        chat.reset();
        assert!(chat.transcript().is_empty());
        assert!(chat.conversation().conversation_id.is_none());
    }
}
