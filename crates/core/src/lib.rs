//! Domain types shared by the persona sessions and the service around them.

pub mod broadcast;
pub mod conversation;
pub mod persona;
pub mod roster;

pub use broadcast::{BroadcastSink, UiEvent};
pub use conversation::{ConversationLog, Role, Utterance, UtteranceKind};
pub use persona::{MeetingTool, PersonaId, PersonaProfile};
pub use roster::{Participant, ParticipantId, ParticipantInfo, ParticipantStatus, Roster};
