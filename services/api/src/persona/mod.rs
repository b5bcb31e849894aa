//! Voice personas and their live sessions.
//!
//! - `session`: one persona's connection, turn state and response handling.
//! - `tools`: functions a persona's model may call.
//! - `registry`: the directory of known personas and started sessions.

pub mod error;
pub mod registry;
pub mod session;
pub mod tools;

pub use error::{DirectoryError, SendOutcome, SessionError};
pub use registry::{PersonaDirectory, PersonaStatus, ProvisionerFactory, SessionDeps};
pub use session::{PersonaSession, TurnTimings};
pub use tools::{CompanionProvisioner, ToolBridge};

use anyhow::Context;
use huddle_core::{MeetingTool, PersonaId, PersonaProfile};
use std::collections::HashMap;

pub const SCOOBY: &str = "scooby";
pub const LYRA: &str = "lyra";

/// The two personas this service runs, with instructions taken from `prompts`
/// (keyed by persona id).
pub fn builtin_profiles(prompts: &HashMap<String, String>) -> anyhow::Result<Vec<PersonaProfile>> {
    let instructions = |id: &str| {
        prompts
            .get(id)
            .cloned()
            .with_context(|| format!("{id}.md not found in prompts directory"))
    };

    Ok(vec![
        PersonaProfile {
            id: PersonaId::new(SCOOBY),
            display_name: "Scooby".to_string(),
            keyword: SCOOBY.to_string(),
            context_label: "Scooby".to_string(),
            voice: "Puck".to_string(),
            temperature: 0.0,
            context_window: 8,
            tools: MeetingTool::ALL.to_vec(),
            relay_to_companion: true,
            companion: Some(PersonaId::new(LYRA)),
            autostart: true,
            instructions: instructions(SCOOBY)?,
        },
        PersonaProfile {
            id: PersonaId::new(LYRA),
            display_name: "Lyra".to_string(),
            keyword: LYRA.to_string(),
            context_label: "lyra AI".to_string(),
            voice: "Kore".to_string(),
            temperature: 0.7,
            context_window: 5,
            tools: Vec::new(),
            relay_to_companion: false,
            companion: Some(PersonaId::new(SCOOBY)),
            autostart: false,
            instructions: instructions(LYRA)?,
        },
    ])
}
