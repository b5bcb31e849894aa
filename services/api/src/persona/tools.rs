//! Local operations exposed to a persona's model as callable functions.

use async_trait::async_trait;
use gemini_realtime::{FunctionCall, FunctionDeclaration, FunctionResponse};
use huddle_core::{MeetingTool, Roster};
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Brings the companion persona's bot into the current meeting.
///
/// `Ok(true)` when the platform accepted the bot, `Ok(false)` when it refused.
#[async_trait]
pub trait CompanionProvisioner: Send + Sync {
    async fn provision_companion(&self) -> anyhow::Result<bool>;
}

/// Per-persona tool dispatcher.
#[derive(Clone)]
pub struct ToolBridge {
    roster: Roster,
    provisioner: Option<Arc<dyn CompanionProvisioner>>,
    enabled: Vec<MeetingTool>,
    companion_name: String,
}

impl ToolBridge {
    pub fn new(
        roster: Roster,
        provisioner: Option<Arc<dyn CompanionProvisioner>>,
        enabled: Vec<MeetingTool>,
        companion_name: impl Into<String>,
    ) -> Self {
        Self {
            roster,
            provisioner,
            enabled,
            companion_name: companion_name.into(),
        }
    }

    pub fn declarations(&self) -> Vec<FunctionDeclaration> {
        self.enabled
            .iter()
            .map(|tool| FunctionDeclaration {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: None,
            })
            .collect()
    }

    /// Runs every call of one tool-call frame, in order.
    ///
    /// A failing call only affects its own result.
    pub async fn dispatch(&self, calls: Vec<FunctionCall>) -> Vec<FunctionResponse> {
        let mut responses = Vec::with_capacity(calls.len());
        for call in calls {
            info!(tool = %call.name, id = %call.id, "Handling function call");
            let result = self.invoke(&call.name).await;
            responses.push(FunctionResponse {
                id: call.id,
                name: call.name,
                response: json!({ "result": result }),
            });
        }
        responses
    }

    async fn invoke(&self, name: &str) -> Value {
        let tool = MeetingTool::from_name(name).filter(|tool| self.enabled.contains(tool));
        match tool {
            Some(MeetingTool::CurrentParticipants) => json!(self.roster.active()),
            Some(MeetingTool::AllParticipants) => json!(self.roster.all()),
            Some(MeetingTool::AddCompanion) => self.add_companion().await,
            None => {
                warn!(tool = %name, "Unknown function call");
                error_result(format!("Unknown function call: {name}"))
            }
        }
    }

    async fn add_companion(&self) -> Value {
        let Some(provisioner) = &self.provisioner else {
            return error_result(format!("Cannot add {} here", self.companion_name));
        };
        match provisioner.provision_companion().await {
            Ok(true) => json!({
                "status": "success",
                "message": format!("{} has been added to the meeting", self.companion_name),
            }),
            Ok(false) => error_result(format!("Failed to add {} bot", self.companion_name)),
            Err(e) => {
                error!(error = ?e, "Companion provisioning failed");
                error_result(format!("Error adding {} bot: {e}", self.companion_name))
            }
        }
    }
}

fn error_result(message: String) -> Value {
    json!({ "status": "error", "message": message })
}
