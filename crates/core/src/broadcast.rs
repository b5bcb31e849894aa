//! Events pushed to the browser UI shared by both personas.

use async_trait::async_trait;
use serde::Serialize;

/// `bot_type` used for events that concern both personas.
pub const BOTH: &str = "both";

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiEvent {
    /// A chunk of model speech (base64 PCM16, 24 kHz).
    Audio { data: String, bot_type: String },
    ModelSpeaking { speaking: bool, bot_type: String },
    Status { connected: bool, bot_type: String },
}

impl UiEvent {
    pub fn bot_type(&self) -> &str {
        match self {
            Self::Audio { bot_type, .. }
            | Self::ModelSpeaking { bot_type, .. }
            | Self::Status { bot_type, .. } => bot_type,
        }
    }
}

/// Fan-out to every registered UI observer.
///
/// Implementations must not let one failing observer hold up the others.
#[async_trait]
pub trait BroadcastSink: Send + Sync {
    async fn send_to_all(&self, event: UiEvent);
}
