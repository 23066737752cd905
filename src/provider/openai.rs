//! OpenAI-compatible provider implementation (Chat Completions API)
//!
//! Works against api.openai.com or any compatible proxy. Uses
//! core::SseDecoder for SSE stream parsing.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::core::SseDecoder;

use super::{
    Completion, CompletionError, CompletionProvider, CompletionRequest, ContentPart,
    MessageContent, StreamEvent, Usage,
};

/// Chat Completions client for an OpenAI-compatible endpoint
pub struct OpenAiProvider {
    client: HttpClient,
    api_key: String,
    url: String,
}

impl OpenAiProvider {
    pub fn new(api_key: String, url: String, timeout: Duration) -> Self {
        let client = HttpClient::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client,
            api_key,
            url,
        }
    }

    /// Convert internal messages to the wire format
    fn build_messages(request: &CompletionRequest) -> Vec<ApiMessage> {
        request
            .messages
            .iter()
            .map(|msg| ApiMessage {
                role: msg.role.as_str().into(),
                content: match &msg.content {
                    MessageContent::Text(text) => ApiContent::Text(text.clone()),
                    MessageContent::Parts(parts) => ApiContent::Parts(
                        parts
                            .iter()
                            .map(|part| match part {
                                ContentPart::Text { text } => ApiPart::Text { text: text.clone() },
                                ContentPart::ImageUrl { url } => ApiPart::ImageUrl {
                                    image_url: ApiImageUrl { url: url.clone() },
                                },
                            })
                            .collect(),
                    ),
                },
            })
            .collect()
    }

    async fn post(
        &self,
        body: &ChatCompletionRequest,
    ) -> Result<reqwest::Response, CompletionError> {
        let response = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("(failed to read body: {})", e));
            return Err(CompletionError::Api { status, body });
        }

        Ok(response)
    }

    /// Process SSE stream and send events to channel
    async fn process_sse_stream(response: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let _ = tx.send(StreamEvent::Error(e.to_string())).await;
                    break;
                }
            };

            for frame in decoder.push(&chunk) {
                if frame.is_done() {
                    continue;
                }

                let chunk_data: StreamChunk = match frame.try_parse() {
                    Some(c) => c,
                    None => continue,
                };

                for choice in chunk_data.choices {
                    if let Some(content) = choice.delta.content {
                        if !content.is_empty() {
                            let _ = tx.send(StreamEvent::TextDelta(content)).await;
                        }
                    }
                }

                if let Some(usage) = chunk_data.usage {
                    let _ = tx
                        .send(StreamEvent::Usage(Usage {
                            input_tokens: usage.prompt_tokens,
                            output_tokens: usage.completion_tokens,
                        }))
                        .await;
                }
            }
        }

        let _ = tx.send(StreamEvent::Done).await;
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn complete(&self, request: CompletionRequest) -> Result<Completion, CompletionError> {
        let body = ChatCompletionRequest {
            model: request.model.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: Self::build_messages(&request),
            stream: false,
        };

        let response = self.post(&body).await?;

        let result: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;

        let choice = result
            .choices
            .first()
            .ok_or_else(|| CompletionError::MalformedResponse("no choices in response".into()))?;

        let text = choice.message.content.clone().unwrap_or_default();

        let usage = result.usage.map(|u| Usage {
            input_tokens: u.prompt_tokens,
            output_tokens: u.completion_tokens,
        });

        Ok(Completion { text, usage })
    }

    async fn complete_stream(
        &self,
        request: CompletionRequest,
    ) -> Result<mpsc::Receiver<StreamEvent>, CompletionError> {
        let body = ChatCompletionRequest {
            model: request.model.clone(),
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            messages: Self::build_messages(&request),
            stream: true,
        };

        let response = self.post(&body).await?;

        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(Self::process_sse_stream(response, tx));

        Ok(rx)
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

// ============================================================================
// Wire Types (OpenAI Chat Completions format)
// ============================================================================

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ApiMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ApiMessage {
    role: String,
    content: ApiContent,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum ApiContent {
    Text(String),
    Parts(Vec<ApiPart>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum ApiPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ApiImageUrl },
}

#[derive(Debug, Serialize)]
struct ApiImageUrl {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

// Streaming types
#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}
