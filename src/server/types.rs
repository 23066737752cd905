//! Server types for the HTTP API
//!
//! Wire-level request shapes and SSE events. The happy-path response is
//! plain text, not JSON - clients read the body as the final answer.

use serde::{Deserialize, Serialize};

/// API version for capability detection
pub const API_VERSION: &str = "2026.2.1";

// ============================================================================
// Request Types
// ============================================================================

/// Chat request from the frontend.
///
/// Either `message` carries the question directly, or the last entry of
/// `messages` does (earlier entries are prior turns).
#[derive(Debug, Default, Deserialize)]
pub struct ChatApiRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub messages: Vec<HistoryMessage>,
    #[serde(default)]
    pub files: Vec<FileUpload>,
    /// Scopes image memory for follow-up questions
    #[serde(default)]
    pub conversation_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileUpload {
    pub name: String,
    #[serde(rename = "type", default)]
    pub media_type: String,
    /// Base64 payload, bare or as a data URL
    pub data: String,
}

// ============================================================================
// SSE Event Types
// ============================================================================

/// Events sent to the frontend via SSE
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ChatEvent {
    /// Streaming answer text
    #[serde(rename = "text_delta")]
    TextDelta { delta: String },

    /// Stream complete
    #[serde(rename = "done")]
    Done,

    /// Error
    #[serde(rename = "error")]
    Error { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_accepts_minimal_body() {
        let req: ChatApiRequest = serde_json::from_str(r#"{"message": "integrate x"}"#).unwrap();
        assert_eq!(req.message.as_deref(), Some("integrate x"));
        assert!(req.messages.is_empty());
        assert!(req.files.is_empty());
    }

    #[test]
    fn test_request_accepts_history_and_files() {
        let req: ChatApiRequest = serde_json::from_str(
            r#"{
                "messages": [
                    {"role": "user", "content": "hi"},
                    {"role": "assistant", "content": "hello"},
                    {"role": "user", "content": "integrate x"}
                ],
                "files": [{"name": "p.png", "type": "image/png", "data": "AAAA"}],
                "conversation_id": "abc"
            }"#,
        )
        .unwrap();
        assert!(req.message.is_none());
        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.files[0].media_type, "image/png");
        assert_eq!(req.conversation_id.as_deref(), Some("abc"));
    }

    #[test]
    fn test_chat_event_serialization() {
        let json = serde_json::to_value(ChatEvent::TextDelta {
            delta: "x^2".into(),
        })
        .unwrap();
        assert_eq!(json["type"], "text_delta");
        assert_eq!(json["delta"], "x^2");

        let json = serde_json::to_value(ChatEvent::Done).unwrap();
        assert_eq!(json["type"], "done");
    }
}
