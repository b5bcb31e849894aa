//! Wire types for the Gemini Live `BidiGenerateContent` protocol.
//!
//! Outbound frames are modelled as `ClientMessage`, an externally tagged enum
//! that serializes to `{"setup": ..}`, `{"realtimeInput": ..}` or
//! `{"toolResponse": ..}`. Inbound frames are decoded once into `ServerFrame`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mime type of the PCM audio the model streams back.
pub const OUTPUT_AUDIO_MIME: &str = "audio/pcm;rate=24000";

// --- Client -> server ---

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    Setup(Setup),
    RealtimeInput(RealtimeInput),
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    /// A `realtimeInput` frame carrying plain text.
    pub fn text(text: impl Into<String>) -> Self {
        Self::RealtimeInput(RealtimeInput { text: text.into() })
    }

    /// A `toolResponse` frame answering one batch of function calls.
    pub fn tool_response(function_responses: Vec<FunctionResponse>) -> Self {
        Self::ToolResponse(ToolResponse { function_responses })
    }
}

/// The first frame of every session.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    pub output_audio_transcription: OutputAudioTranscription,
    pub system_instruction: Content,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolSet>,
}

impl Setup {
    /// Creates an audio-only setup for `model` with the given system instructions.
    ///
    /// The `models/` prefix is added when missing.
    pub fn new(model: &str, instructions: impl Into<String>) -> Self {
        let model = if model.starts_with("models/") {
            model.to_string()
        } else {
            format!("models/{model}")
        };
        Self {
            model,
            generation_config: GenerationConfig {
                temperature: None,
                response_modalities: vec![ResponseModality::Audio],
                speech_config: None,
            },
            output_audio_transcription: OutputAudioTranscription {},
            system_instruction: Content {
                parts: vec![TextPart {
                    text: instructions.into(),
                }],
            },
            tools: Vec::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.generation_config.temperature = Some(temperature);
        self
    }

    pub fn with_voice(mut self, voice_name: impl Into<String>) -> Self {
        self.generation_config.speech_config = Some(SpeechConfig {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: voice_name.into(),
                },
            },
        });
        self
    }

    /// Declares callable tools. An empty list leaves `tools` out of the frame.
    pub fn with_tools(mut self, declarations: Vec<FunctionDeclaration>) -> Self {
        self.tools = if declarations.is_empty() {
            Vec::new()
        } else {
            vec![ToolSet {
                function_declarations: declarations,
            }]
        };
        self
    }
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    pub response_modalities: Vec<ResponseModality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum ResponseModality {
    Text,
    Audio,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// Empty marker object that turns on transcription of the model's audio.
#[derive(Serialize, Debug, Clone)]
pub struct OutputAudioTranscription {}

#[derive(Serialize, Debug, Clone)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Serialize, Debug, Clone)]
pub struct TextPart {
    pub text: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ToolSet {
    pub function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct FunctionDeclaration {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Serialize, Debug, Clone)]
pub struct RealtimeInput {
    pub text: String,
}

#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    pub function_responses: Vec<FunctionResponse>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionResponse {
    pub id: String,
    pub name: String,
    pub response: Value,
}

// --- Server -> client ---

/// One inbound frame, classified once at the socket boundary.
#[derive(Debug, Clone)]
pub enum ServerFrame {
    /// Model-initiated function calls. Takes precedence over any content.
    ToolCall(ToolCall),
    Content(ServerContent),
    Error(Value),
    SetupComplete,
    Unknown,
}

impl ServerFrame {
    /// Decodes a raw JSON frame.
    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        let message: RawServerMessage = serde_json::from_str(raw)?;
        Ok(if let Some(tool_call) = message.tool_call {
            Self::ToolCall(tool_call)
        } else if let Some(content) = message.server_content {
            Self::Content(content)
        } else if let Some(error) = message.error {
            Self::Error(error)
        } else if message.setup_complete.is_some() {
            Self::SetupComplete
        } else {
            Self::Unknown
        })
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RawServerMessage {
    setup_complete: Option<Value>,
    tool_call: Option<ToolCall>,
    server_content: Option<ServerContent>,
    error: Option<Value>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
pub struct FunctionCall {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    pub output_transcription: Option<Transcription>,
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
}

impl ServerContent {
    /// Text of the output transcription fragment, if any.
    pub fn transcription(&self) -> Option<&str> {
        self.output_transcription
            .as_ref()
            .and_then(|t| t.text.as_deref())
    }

    pub fn parts(&self) -> &[Part] {
        self.model_turn
            .as_ref()
            .map(|turn| turn.parts.as_slice())
            .unwrap_or_default()
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct Transcription {
    pub text: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    pub text: Option<String>,
    pub inline_data: Option<InlineData>,
}

impl Part {
    /// Base64 audio payload, when this part carries model speech.
    pub fn audio(&self) -> Option<&str> {
        self.inline_data
            .as_ref()
            .filter(|blob| blob.mime_type == OUTPUT_AUDIO_MIME && !blob.data.is_empty())
            .map(|blob| blob.data.as_str())
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub data: String,
}
