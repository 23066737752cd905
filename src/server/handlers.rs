//! HTTP handlers: status, buffered chat, and SSE streaming chat
//!
//! Verification and streaming are mutually exclusive per attempt: questions
//! routed through the checked pipeline are fully buffered, then re-chunked
//! to SSE callers; everything else streams straight from the provider.

use axum::{
    extract::State,
    http::header,
    response::{
        sse::{Event, KeepAlive, KeepAliveStream, Sse},
        IntoResponse, Json, Response,
    },
};
use futures::stream::{BoxStream, StreamExt};
use serde_json::{json, Value};
use std::convert::Infallible;

use crate::config::CONFIG;
use crate::ingest::{self, Attachment, PreparedInput};
use crate::provider::{ChatMessage, MessageContent, MessageRole, StreamEvent};

use super::error::{ApiError, ApiResult};
use super::types::{ChatApiRequest, ChatEvent, HistoryMessage};
use super::AppState;

/// Character budget per SSE chunk when re-chunking a buffered answer
const RECHUNK_SIZE: usize = 160;

// ============================================================================
// Status
// ============================================================================

/// Health check and status endpoint
pub async fn status_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "model": CONFIG.model,
        "escalation_model": CONFIG.escalation_model,
        "max_attempts": CONFIG.max_attempts,
        "upstream_configured": state.provider.is_some(),
        "timestamp": chrono::Utc::now().timestamp(),
    }))
}

// ============================================================================
// Input extraction
// ============================================================================

/// Current question text plus the prior turns, per the wire contract:
/// `message` wins; otherwise the last `messages` entry is the question.
fn extract_user_turn(req: &ChatApiRequest) -> (String, Vec<HistoryMessage>) {
    if let Some(message) = req.message.as_ref().filter(|m| !m.trim().is_empty()) {
        return (message.clone(), req.messages.clone());
    }
    match req.messages.split_last() {
        Some((last, rest)) => (last.content.clone(), rest.to_vec()),
        None => (String::new(), Vec::new()),
    }
}

/// Prior turns as provider messages. Client-sent system roles are dropped -
/// the pipeline owns the system prompt.
fn history_to_messages(history: &[HistoryMessage]) -> Vec<ChatMessage> {
    history
        .iter()
        .filter(|m| !m.content.trim().is_empty())
        .map(|m| ChatMessage {
            role: MessageRole::from_wire(&m.role),
            content: MessageContent::Text(m.content.clone()),
        })
        .filter(|m| m.role != MessageRole::System)
        .collect()
}

/// Validate the request and fold in attachments and conversation images.
async fn prepare_input(
    state: &AppState,
    req: &ChatApiRequest,
) -> ApiResult<(PreparedInput, Vec<ChatMessage>)> {
    let (text, history) = extract_user_turn(req);

    if text.trim().is_empty() && req.files.is_empty() {
        return Err(ApiError::bad_request("Missing message"));
    }

    let attachments: Vec<Attachment<'_>> = req
        .files
        .iter()
        .map(|f| Attachment {
            name: &f.name,
            media_type: &f.media_type,
            data: &f.data,
        })
        .collect();

    let mut prepared = ingest::prepare(&text, &attachments).map_err(ApiError::from_ingest)?;

    // Conversation image memory: new uploads are remembered, follow-ups
    // without an upload reuse the conversation's latest images.
    if let Some(conversation_id) = &req.conversation_id {
        if prepared.image_urls.is_empty() {
            prepared.image_urls = state.conversations.recall(conversation_id).await;
        } else {
            state
                .conversations
                .remember(conversation_id, prepared.image_urls.clone())
                .await;
        }
    }

    Ok((prepared, history_to_messages(&history)))
}

// ============================================================================
// Buffered chat
// ============================================================================

/// POST /api/chat - buffered plain-text answer
pub async fn chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatApiRequest>,
) -> ApiResult<Response> {
    let provider = state.provider()?;
    let (prepared, history) = prepare_input(&state, &req).await?;

    let reply = state
        .pipeline
        .answer(
            provider.as_ref(),
            &prepared.text,
            &prepared.image_urls,
            &history,
        )
        .await
        .map_err(ApiError::from_pipeline)?;

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        reply.text,
    )
        .into_response())
}

// ============================================================================
// Streaming chat
// ============================================================================

type EventStream = BoxStream<'static, Result<Event, Infallible>>;

fn sse_event(event: &ChatEvent) -> Option<Event> {
    Event::default().json_data(event).ok()
}

/// Re-chunk an already-verified answer so SSE clients still render
/// progressively.
fn chunk_text(text: &str, size: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if current.len() >= size {
            chunks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

fn rechunked_stream(text: String) -> EventStream {
    let stream = async_stream::stream! {
        for chunk in chunk_text(&text, RECHUNK_SIZE) {
            if let Some(event) = sse_event(&ChatEvent::TextDelta { delta: chunk }) {
                yield Ok(event);
            }
        }
        if let Some(event) = sse_event(&ChatEvent::Done) {
            yield Ok(event);
        }
    };
    stream.boxed()
}

fn forwarded_stream(mut rx: tokio::sync::mpsc::Receiver<StreamEvent>) -> EventStream {
    let stream = async_stream::stream! {
        while let Some(ev) = rx.recv().await {
            match ev {
                StreamEvent::TextDelta(delta) => {
                    if let Some(event) = sse_event(&ChatEvent::TextDelta { delta }) {
                        yield Ok(event);
                    }
                }
                StreamEvent::Error(message) => {
                    tracing::error!(%message, "upstream stream error");
                    if let Some(event) = sse_event(&ChatEvent::Error { message }) {
                        yield Ok(event);
                    }
                    break;
                }
                StreamEvent::Usage(_) => {}
                StreamEvent::Done => break,
            }
        }
        if let Some(event) = sse_event(&ChatEvent::Done) {
            yield Ok(event);
        }
    };
    stream.boxed()
}

/// POST /api/chat/stream - SSE answer
pub async fn chat_stream_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatApiRequest>,
) -> ApiResult<Sse<KeepAliveStream<EventStream>>> {
    let provider = state.provider()?;
    let (prepared, history) = prepare_input(&state, &req).await?;
    let (normalized, tags) = state.pipeline.classify_question(&prepared.text);

    let stream = if tags.requires_verification {
        let reply = state
            .pipeline
            .answer_checked(
                provider.as_ref(),
                &normalized,
                &tags,
                &prepared.image_urls,
                &history,
            )
            .await
            .map_err(ApiError::from_pipeline)?;
        rechunked_stream(reply.text)
    } else {
        let rx = state
            .pipeline
            .open_stream(
                provider.as_ref(),
                &normalized,
                &tags,
                &prepared.image_urls,
                &history,
            )
            .await
            .map_err(ApiError::from_pipeline)?;
        forwarded_stream(rx)
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
