//! HTTP client for the meeting-bot platform.

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Events each bot subscribes its webhook to.
pub const WEBHOOK_EVENTS: [&str; 3] = [
    "transcript.data",
    "participant_events.join",
    "participant_events.leave",
];

const BOT_VARIANT: &str = "web_4_core";

#[derive(Debug, thiserror::Error)]
pub enum RecallError {
    #[error("request to the meeting platform timed out")]
    Timeout,
    #[error("meeting platform returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("meeting platform request failed: {0}")]
    Http(#[source] reqwest::Error),
}

impl From<reqwest::Error> for RecallError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

/// Body of a create-bot request.
#[derive(Serialize, Debug, Clone)]
pub struct BotRequest {
    pub meeting_url: String,
    pub bot_name: String,
    pub recording_config: RecordingConfig,
    pub output_media: OutputMedia,
    pub variant: Variant,
}

#[derive(Serialize, Debug, Clone)]
pub struct RecordingConfig {
    pub realtime_endpoints: Vec<RealtimeEndpoint>,
    pub transcript: TranscriptConfig,
}

#[derive(Serialize, Debug, Clone)]
pub struct RealtimeEndpoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub events: Vec<String>,
}

#[derive(Serialize, Debug, Clone)]
pub struct TranscriptConfig {
    pub provider: TranscriptProvider,
}

#[derive(Serialize, Debug, Clone, Default)]
pub struct TranscriptProvider {
    pub meeting_captions: serde_json::Map<String, Value>,
}

#[derive(Serialize, Debug, Clone)]
pub struct OutputMedia {
    pub camera: Camera,
}

#[derive(Serialize, Debug, Clone)]
pub struct Camera {
    pub kind: String,
    pub config: CameraConfig,
}

#[derive(Serialize, Debug, Clone)]
pub struct CameraConfig {
    pub url: String,
}

#[derive(Serialize, Debug, Clone)]
pub struct Variant {
    pub zoom: String,
    pub google_meet: String,
    pub microsoft_teams: String,
}

impl BotRequest {
    /// A bot that renders `camera_url` as its video and streams meeting events to `webhook_url`.
    pub fn new(meeting_url: &str, bot_name: &str, webhook_url: &str, camera_url: &str) -> Self {
        Self {
            meeting_url: meeting_url.to_string(),
            bot_name: bot_name.to_string(),
            recording_config: RecordingConfig {
                realtime_endpoints: vec![RealtimeEndpoint {
                    kind: "webhook".to_string(),
                    url: webhook_url.to_string(),
                    events: WEBHOOK_EVENTS.iter().map(|e| e.to_string()).collect(),
                }],
                transcript: TranscriptConfig {
                    provider: TranscriptProvider::default(),
                },
            },
            output_media: OutputMedia {
                camera: Camera {
                    kind: "webpage".to_string(),
                    config: CameraConfig {
                        url: camera_url.to_string(),
                    },
                },
            },
            variant: Variant {
                zoom: BOT_VARIANT.to_string(),
                google_meet: BOT_VARIANT.to_string(),
                microsoft_teams: BOT_VARIANT.to_string(),
            },
        }
    }
}

#[derive(Clone)]
pub struct RecallClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl RecallClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self, RecallError> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Sends a bot into a meeting. Returns the platform's bot record.
    pub async fn create_bot(&self, request: &BotRequest) -> Result<Value, RecallError> {
        let url = format!("{}/bot/", self.base_url);
        info!(meeting_url = %request.meeting_url, bot_name = %request.bot_name, "Creating meeting bot");
        let response = self
            .http
            .post(url)
            .header("Authorization", &self.api_key)
            .header("accept", "application/json")
            .json(request)
            .send()
            .await?;
        Self::into_json(response).await
    }

    /// Asks a bot to leave its call.
    pub async fn leave_call(&self, bot_id: &str) -> Result<Value, RecallError> {
        let url = format!("{}/bot/{}/leave_call/", self.base_url, bot_id);
        info!(%bot_id, "Removing meeting bot");
        let response = self
            .http
            .post(url)
            .header("Authorization", &self.api_key)
            .header("accept", "application/json")
            .send()
            .await?;
        Self::into_json(response).await
    }

    async fn into_json(response: reqwest::Response) -> Result<Value, RecallError> {
        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            warn!(%status, %body, "Meeting platform refused request");
            return Err(RecallError::Status { status, body });
        }
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| RecallError::Status {
            status,
            body: format!("unreadable response body: {e}"),
        })
    }
}

/// Extracts the bot id from a create-bot response.
pub fn bot_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}
