use serde::{Deserialize, Serialize};
use std::fmt;

/// Stable persona key, e.g. `scooby`. Doubles as the UI `bot_type`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct PersonaId(pub String);

impl PersonaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local operations a persona's model may call.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MeetingTool {
    /// Participants currently in the meeting.
    CurrentParticipants,
    /// Everyone who joined, including those who left.
    AllParticipants,
    /// Bring the companion persona's bot into the meeting.
    AddCompanion,
}

impl MeetingTool {
    pub const ALL: [MeetingTool; 3] = [
        MeetingTool::CurrentParticipants,
        MeetingTool::AllParticipants,
        MeetingTool::AddCompanion,
    ];

    /// Function name on the wire.
    pub fn name(&self) -> &'static str {
        match self {
            Self::CurrentParticipants => "get_current_participants",
            Self::AllParticipants => "get_all_joined_participants",
            Self::AddCompanion => "add_companion_bot",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::CurrentParticipants => "Gets the participants who are in the meeting right now.",
            Self::AllParticipants => {
                "Gets everyone who has joined the meeting, including participants who have since left."
            }
            Self::AddCompanion => "Adds the companion AI assistant to the current meeting.",
        }
    }
}

/// Everything that distinguishes one persona from the other.
#[derive(Debug, Clone)]
pub struct PersonaProfile {
    pub id: PersonaId,
    /// Used when attributing this persona's words to its companion.
    pub display_name: String,
    /// Lowercase word that addresses this persona in a transcript.
    pub keyword: String,
    /// Label for this persona's turns in the context window.
    pub context_label: String,
    pub voice: String,
    pub temperature: f32,
    /// How many prior log entries are prepended to each message.
    pub context_window: usize,
    pub tools: Vec<MeetingTool>,
    /// Forward finished turns that mention the companion to it.
    pub relay_to_companion: bool,
    pub companion: Option<PersonaId>,
    /// Connect at startup rather than on demand.
    pub autostart: bool,
    pub instructions: String,
}

impl PersonaProfile {
    /// Whether `text` addresses this persona.
    pub fn is_mentioned_in(&self, text: &str) -> bool {
        !self.keyword.is_empty() && text.to_lowercase().contains(&self.keyword.to_lowercase())
    }

    pub fn has_tool(&self, tool: MeetingTool) -> bool {
        self.tools.contains(&tool)
    }
}
