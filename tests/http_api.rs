// tests/http_api.rs
// Router-level contract tests: status codes, content types, image memory.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::json;
use tower::ServiceExt;

use common::{test_pipeline, StubProvider};
use woody::pipeline::ChatPipeline;
use woody::provider::{CompletionProvider, ContentPart, MessageContent};
use woody::server::{create_router, AppState};
use woody::session::ConversationStore;

const CLEAN_ANSWER: &str = "Classification: Technique of Integration\n$$\\boxed{x^2/2 + C}$$";

fn app_with(provider: Option<Arc<dyn CompletionProvider>>, pipeline: ChatPipeline) -> Router {
    create_router(AppState {
        provider,
        pipeline: Arc::new(pipeline),
        conversations: Arc::new(ConversationStore::new(8)),
    })
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).to_string()
}

#[tokio::test]
async fn status_endpoint_reports_ok_and_version() {
    let stub: Arc<dyn CompletionProvider> = Arc::new(StubProvider::always(CLEAN_ANSWER));
    let app = app_with(Some(stub), test_pipeline(3));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-api-version"));

    let body: serde_json::Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["upstream_configured"], true);
}

#[tokio::test]
async fn missing_message_is_400() {
    let stub: Arc<dyn CompletionProvider> = Arc::new(StubProvider::always(CLEAN_ANSWER));
    let app = app_with(Some(stub), test_pipeline(3));

    let response = app.oneshot(post_json("/api/chat", json!({}))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_string(response).await, "Missing message");
}

#[tokio::test]
async fn wrong_method_is_405() {
    let stub: Arc<dyn CompletionProvider> = Arc::new(StubProvider::always(CLEAN_ANSWER));
    let app = app_with(Some(stub), test_pipeline(3));

    let response = app
        .oneshot(
            Request::builder()
                .method("GET")
                .uri("/api/chat")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn unsupported_attachment_is_422_before_any_model_call() {
    let stub = Arc::new(StubProvider::always(CLEAN_ANSWER));
    let provider: Arc<dyn CompletionProvider> = stub.clone();
    let app = app_with(Some(provider), test_pipeline(3));

    let response = app
        .oneshot(post_json(
            "/api/chat",
            json!({
                "message": "integrate x",
                "files": [{"name": "notes.docx", "type": "application/msword", "data": "AAAA"}]
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(stub.call_count(), 0, "no paid call for unusable input");
}

#[tokio::test]
async fn missing_credential_is_500_with_fixed_diagnostic() {
    let app = app_with(None, test_pipeline(3));

    let response = app
        .oneshot(post_json("/api/chat", json!({"message": "integrate x"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_string(response).await, "Missing OPENAI_API_KEY");
}

#[tokio::test]
async fn chat_returns_plain_text_answer() {
    let stub = Arc::new(StubProvider::always(CLEAN_ANSWER));
    let provider: Arc<dyn CompletionProvider> = stub.clone();
    let app = app_with(Some(provider), test_pipeline(3));

    let response = app
        .oneshot(post_json("/api/chat", json!({"message": "integrate x dx"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/plain"));
    assert_eq!(body_string(response).await, CLEAN_ANSWER);
    assert_eq!(stub.call_count(), 1);
}

#[tokio::test]
async fn upstream_failure_surfaces_diagnostic() {
    use common::Scripted;
    let stub: Arc<dyn CompletionProvider> = Arc::new(StubProvider::new(vec![
        Scripted::Fail,
        Scripted::Fail,
        Scripted::Fail,
    ]));
    let app = app_with(Some(stub), test_pipeline(3));

    let response = app
        .oneshot(post_json("/api/chat", json!({"message": "integrate x dx"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = body_string(response).await;
    assert!(body.contains("upstream"), "diagnostic should mention upstream: {}", body);
}

#[tokio::test]
async fn conversation_images_carry_into_follow_ups() {
    let stub = Arc::new(StubProvider::always(CLEAN_ANSWER));
    let provider: Arc<dyn CompletionProvider> = stub.clone();
    let app = app_with(Some(provider), test_pipeline(3));

    // First request uploads an image under a conversation id
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/chat",
            json!({
                "message": "integrate the problem in the image",
                "conversation_id": "conv-1",
                "files": [{"name": "p.png", "type": "image/png", "data": "AAAA"}]
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Follow-up in the same conversation, no new upload
    let response = app
        .oneshot(post_json(
            "/api/chat",
            json!({
                "message": "now integrate it by substitution",
                "conversation_id": "conv-1"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let calls = stub.calls.lock().unwrap();
    let last_user = calls
        .last()
        .unwrap()
        .messages
        .last()
        .unwrap()
        .clone();
    match last_user.content {
        MessageContent::Parts(parts) => {
            assert!(
                parts
                    .iter()
                    .any(|p| matches!(p, ContentPart::ImageUrl { url } if url.contains("AAAA"))),
                "follow-up must reuse the stored image"
            );
        }
        MessageContent::Text(_) => panic!("follow-up lost the conversation image"),
    }
}

#[tokio::test]
async fn stream_endpoint_emits_sse_events() {
    let stub: Arc<dyn CompletionProvider> = Arc::new(StubProvider::always(CLEAN_ANSWER));
    let app = app_with(Some(stub), test_pipeline(3));

    // A verified question: buffered through the checked pipeline, then re-chunked
    let response = app
        .oneshot(post_json(
            "/api/chat/stream",
            json!({"message": "integrate x dx"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers()["content-type"].to_str().unwrap().to_string();
    assert!(content_type.starts_with("text/event-stream"));

    let body = body_string(response).await;
    assert!(body.contains("text_delta"));
    assert!(body.contains("\"type\":\"done\""));
}

#[tokio::test]
async fn stream_endpoint_fast_path_for_unverified_questions() {
    let stub = Arc::new(StubProvider::always("A derivative measures change."));
    let provider: Arc<dyn CompletionProvider> = stub.clone();
    let app = app_with(Some(provider), test_pipeline(3));

    let response = app
        .oneshot(post_json(
            "/api/chat/stream",
            json!({"message": "what does a derivative mean"}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_string(response).await;
    assert!(body.contains("derivative"));
    assert_eq!(stub.call_count(), 1, "fast path is a single unchecked call");
}
