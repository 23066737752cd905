//! HTTP server for the tutoring frontend
//!
//! Endpoints:
//! - GET  /api/status      - health check
//! - POST /api/chat        - buffered plain-text answer (checked pipeline)
//! - POST /api/chat/stream - SSE answer (checked questions buffer first)

pub mod error;
mod handlers;
pub mod types;

use anyhow::Result;
use axum::{
    http::{header, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;

use crate::config::WoodyConfig;
use crate::pipeline::ChatPipeline;
use crate::provider::{CompletionProvider, OpenAiProvider};
use crate::session::ConversationStore;

use error::ApiError;
pub use types::API_VERSION;

// ============================================================================
// Server State
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    /// None when the upstream credential is missing; requests then 500
    pub provider: Option<Arc<dyn CompletionProvider>>,
    pub pipeline: Arc<ChatPipeline>,
    pub conversations: Arc<ConversationStore>,
}

impl AppState {
    pub fn from_config(config: &WoodyConfig) -> Result<Self> {
        let provider = config.openai_api_key.as_ref().map(|key| {
            Arc::new(OpenAiProvider::new(
                key.clone(),
                config.chat_completions_url(),
                config.request_timeout(),
            )) as Arc<dyn CompletionProvider>
        });

        if provider.is_none() {
            tracing::warn!("OPENAI_API_KEY not set - chat requests will be rejected");
        }

        Ok(Self {
            provider,
            pipeline: Arc::new(ChatPipeline::from_config(config)?),
            conversations: Arc::new(ConversationStore::new(config.conversation_cap)),
        })
    }

    /// Configured provider, or the fixed configuration-error diagnostic.
    pub(crate) fn provider(&self) -> Result<Arc<dyn CompletionProvider>, ApiError> {
        self.provider
            .clone()
            .ok_or_else(|| ApiError::internal("Missing OPENAI_API_KEY"))
    }
}

// ============================================================================
// Routes
// ============================================================================

/// Create the router with all endpoints
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    // API version header on all responses
    let version_header = SetResponseHeaderLayer::if_not_present(
        header::HeaderName::from_static("x-api-version"),
        HeaderValue::from_static(API_VERSION),
    );

    Router::new()
        .route("/api/status", get(handlers::status_handler))
        .route("/api/chat", post(handlers::chat_handler))
        .route("/api/chat/stream", post(handlers::chat_stream_handler))
        .layer(version_header)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(config: &WoodyConfig) -> Result<()> {
    let state = AppState::from_config(config)?;
    let app = create_router(state);

    let bind_address = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&bind_address).await?;
    tracing::info!("Server listening on http://{}", bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
