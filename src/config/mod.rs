// src/config/mod.rs
// All tunables load from the environment (.env supported); sane defaults otherwise.

use once_cell::sync::Lazy;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct WoodyConfig {
    // ── Upstream completion API
    pub openai_base_url: String,
    pub openai_api_key: Option<String>,
    pub model: String,
    pub escalation_model: String,
    pub max_output_tokens: u32,
    pub openai_timeout: u64,

    // ── Verification / escalation policy
    pub max_attempts: u32,

    // ── Prompt configuration
    pub prompt_config_path: Option<String>,

    // ── Conversation image memory
    pub conversation_cap: usize,

    // ── Server Configuration
    pub host: String,
    pub port: u16,

    // ── Logging Configuration
    pub log_level: String,
}

fn env_var_or<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    match std::env::var(key) {
        Ok(val) => {
            // Values may carry trailing comments or whitespace in .env files
            let clean = val.split('#').next().unwrap_or("").trim();
            match clean.parse::<T>() {
                Ok(parsed) => parsed,
                Err(_) => {
                    eprintln!("Config: {} = '{}' (parse failed, using default)", key, val);
                    default
                }
            }
        }
        Err(_) => default,
    }
}

fn env_var_opt(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl WoodyConfig {
    pub fn from_env() -> Self {
        // Load from .env file first if it exists
        let _ = dotenvy::dotenv();

        Self {
            openai_base_url: env_var_or("OPENAI_BASE_URL", "https://api.openai.com".to_string()),
            openai_api_key: env_var_opt("OPENAI_API_KEY"),
            model: env_var_or("WOODY_MODEL", "gpt-4o".to_string()),
            escalation_model: env_var_or("WOODY_ESCALATION_MODEL", "gpt-5".to_string()),
            max_output_tokens: env_var_or("WOODY_MAX_OUTPUT_TOKENS", 2048),
            openai_timeout: env_var_or("WOODY_OPENAI_TIMEOUT", 60),
            max_attempts: env_var_or("WOODY_MAX_ATTEMPTS", 3),
            prompt_config_path: env_var_opt("WOODY_PROMPT_CONFIG"),
            conversation_cap: env_var_or("WOODY_CONVERSATION_CAP", 64),
            host: env_var_or("WOODY_HOST", "0.0.0.0".to_string()),
            port: env_var_or("WOODY_PORT", 8080),
            log_level: env_var_or("WOODY_LOG_LEVEL", "info".to_string()),
        }
    }

    // --- Convenience Methods for Common Operations ---

    /// Full URL of the chat completions endpoint
    pub fn chat_completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.openai_base_url.trim_end_matches('/'))
    }

    /// Get server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Upstream request timeout as a Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.openai_timeout)
    }

    /// Whether the upstream credential is configured
    pub fn has_api_key(&self) -> bool {
        self.openai_api_key.is_some()
    }
}

// Global config instance - loaded once at startup
pub static CONFIG: Lazy<WoodyConfig> = Lazy::new(WoodyConfig::from_env);
