//! API Models
//!
//! Request/response bodies for the HTTP endpoints and the subset of the
//! meeting platform's webhook payloads this service acts on.

use crate::persona::SendOutcome;
use huddle_core::{ParticipantId, ParticipantInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Deserialize, Debug)]
pub struct AddBotRequest {
    pub meeting_url: String,
    /// Persona id of the bot to add.
    pub bot_type: String,
}

#[derive(Deserialize, Debug)]
pub struct RemoveBotRequest {
    pub bot_id: String,
}

#[derive(Serialize, Debug)]
pub struct BotResponse {
    pub success: bool,
    pub message: String,
    pub bot_id: Option<String>,
    pub bot_data: Value,
    pub active_bots_count: usize,
}

#[derive(Serialize, Debug)]
pub struct StartResponse {
    pub status: &'static str,
    pub outcome: SendOutcome,
}

#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub message: String,
}

/// Raw webhook body: `{"event": "...", "data": {"data": {...}}}`.
#[derive(Deserialize, Debug)]
pub struct WebhookPayload {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

#[derive(Deserialize, Debug)]
pub struct TranscriptData {
    #[serde(default)]
    pub words: Vec<Word>,
    pub participant: Speaker,
}

#[derive(Deserialize, Debug)]
pub struct Word {
    pub text: String,
}

#[derive(Deserialize, Debug)]
pub struct Speaker {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ParticipantJoinData {
    pub participant: ParticipantInfo,
    #[serde(default)]
    pub action: Option<String>,
}

#[derive(Deserialize, Debug)]
pub struct ParticipantLeaveData {
    pub participant: ParticipantRef,
}

#[derive(Deserialize, Debug)]
pub struct ParticipantRef {
    pub id: ParticipantId,
}

/// A webhook event this service understands.
#[derive(Debug)]
pub enum WebhookEvent {
    Transcript { speaker: String, text: String },
    ParticipantJoined(ParticipantJoinData),
    ParticipantLeft(ParticipantId),
    Other(String),
}

impl WebhookPayload {
    /// Classifies the payload. Known events with an unexpected shape are errors.
    pub fn into_event(self) -> Result<WebhookEvent, serde_json::Error> {
        let inner = self.data.get("data").cloned().unwrap_or(Value::Null);
        Ok(match self.event.as_str() {
            "transcript.data" => {
                let data: TranscriptData = serde_json::from_value(inner)?;
                let text = data
                    .words
                    .iter()
                    .map(|w| w.text.as_str())
                    .collect::<Vec<_>>()
                    .join(" ");
                WebhookEvent::Transcript {
                    speaker: data.participant.name.unwrap_or_default(),
                    text,
                }
            }
            "participant_events.join" => {
                WebhookEvent::ParticipantJoined(serde_json::from_value(inner)?)
            }
            "participant_events.leave" => {
                let data: ParticipantLeaveData = serde_json::from_value(inner)?;
                WebhookEvent::ParticipantLeft(data.participant.id)
            }
            _ => WebhookEvent::Other(self.event),
        })
    }
}
