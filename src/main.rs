// src/main.rs

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use woody::config::CONFIG;
use woody::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing (RUST_LOG wins over the configured level)
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(CONFIG.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Woody backend");
    info!(
        "Model: {} (escalation: {}, max attempts: {})",
        CONFIG.model, CONFIG.escalation_model, CONFIG.max_attempts
    );
    if let Some(path) = &CONFIG.prompt_config_path {
        info!("Prompt config: {}", path);
    }
    if !CONFIG.has_api_key() {
        warn!("OPENAI_API_KEY is not set - chat endpoints will return 500");
    }

    server::run(&CONFIG).await
}
