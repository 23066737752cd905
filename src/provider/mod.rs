//! Completion provider abstraction
//!
//! The sole I/O boundary to the upstream text-generation API. One invocation
//! means exactly one upstream call; retry and escalation live in the pipeline,
//! never here.

mod openai;

pub use openai::OpenAiProvider;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

/// Unified provider trait for completion backends
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Create a non-streaming chat completion
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError>;

    /// Create a streaming chat completion
    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, CompletionError>;

    /// Get the provider name for logging
    fn name(&self) -> &'static str;
}

// ============================================================================
// Messages
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    /// Parse a wire role string; anything unrecognized is treated as user input.
    pub fn from_wire(s: &str) -> Self {
        match s {
            "system" => MessageRole::System,
            "assistant" => MessageRole::Assistant,
            _ => MessageRole::User,
        }
    }
}

/// One conversation turn sent upstream
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: MessageContent,
}

/// Plain text or structured multi-part content (text + images)
#[derive(Debug, Clone)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone)]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { url: String },
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// User turn carrying the question text plus attached images
    pub fn user_with_images(text: impl Into<String>, image_urls: &[String]) -> Self {
        if image_urls.is_empty() {
            return Self::user(text);
        }
        let mut parts = vec![ContentPart::Text { text: text.into() }];
        parts.extend(image_urls.iter().map(|url| ContentPart::ImageUrl {
            url: url.clone(),
        }));
        Self {
            role: MessageRole::User,
            content: MessageContent::Parts(parts),
        }
    }
}

// ============================================================================
// Request / Response
// ============================================================================

/// One upstream completion call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    /// Pinned to 0 by the pipeline: graded math must not sample
    pub temperature: f32,
    pub max_tokens: u32,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Option<Usage>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Incremental events from a streaming completion
#[derive(Debug, Clone)]
pub enum StreamEvent {
    TextDelta(String),
    Usage(Usage),
    Done,
    Error(String),
}

// ============================================================================
// Errors
// ============================================================================

/// Failure modes of a single completion call.
///
/// Callers must be able to tell "the model returned empty text" (a normal
/// `Completion`) apart from "the call itself failed" (one of these).
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("completion API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("malformed completion response: {0}")]
    MalformedResponse(String),
}
