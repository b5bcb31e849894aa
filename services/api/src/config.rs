use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;

use gemini_realtime::connection::{DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT};

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-live-001";
pub const DEFAULT_RECALL_API_URL: &str = "https://us-west-2.recall.ai/api/v1";

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_ws_url: String,
    pub gemini_connect_timeout: Duration,
    pub recall_api_key: String,
    pub recall_api_url: String,
    /// Externally reachable origin of this service, used in webhook and camera page URLs.
    pub public_base_url: String,
    /// Empty means any origin.
    pub allowed_origins: Vec<String>,
    pub log_level: Level,
    pub prompts_path: PathBuf,
    pub static_dir: PathBuf,
}

fn required(var: &str) -> Result<String, ConfigError> {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingVar(var.to_string()))
}

fn or_default(var: &str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let mut bind_address = or_default("BIND_ADDRESS", "0.0.0.0:8000")
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;
        if let Ok(port) = std::env::var("PORT") {
            let port = port
                .parse::<u16>()
                .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), e.to_string()))?;
            bind_address.set_port(port);
        }

        let gemini_api_key = required("GEMINI_API_KEY")?;
        let gemini_model = or_default("GEMINI_MODEL", DEFAULT_MODEL);
        let gemini_ws_url = or_default("GEMINI_WS_URL", DEFAULT_BASE_URL);

        let gemini_connect_timeout = match std::env::var("GEMINI_CONNECT_TIMEOUT_SECS") {
            Ok(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "GEMINI_CONNECT_TIMEOUT_SECS".to_string(),
                        format!("'{}' is not a positive number of seconds", raw),
                    )
                })?,
            Err(_) => DEFAULT_CONNECT_TIMEOUT,
        };

        let recall_api_key = required("RECALL_API_KEY")?;
        let recall_api_url = or_default("RECALL_API_URL", DEFAULT_RECALL_API_URL)
            .trim_end_matches('/')
            .to_string();

        let public_base_url = or_default("PUBLIC_BASE_URL", "http://localhost:8000")
            .trim_end_matches('/')
            .to_string();

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        let log_level_str = or_default("RUST_LOG", "INFO");
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let prompts_path = PathBuf::from(or_default("PROMPTS_PATH", "./prompts"));
        let static_dir = PathBuf::from(or_default("STATIC_DIR", "./static"));

        Ok(Self {
            bind_address,
            gemini_api_key,
            gemini_model,
            gemini_ws_url,
            gemini_connect_timeout,
            recall_api_key,
            recall_api_url,
            public_base_url,
            allowed_origins,
            log_level,
            prompts_path,
            static_dir,
        })
    }

    /// Where the meeting platform should deliver realtime events.
    pub fn webhook_url(&self) -> String {
        format!("{}/api/webhook/recall", self.public_base_url)
    }

    /// Page a persona's bot renders as its camera feed.
    pub fn camera_page_url(&self, persona: &str) -> String {
        format!("{}/{}.html", self.public_base_url, persona)
    }
}
