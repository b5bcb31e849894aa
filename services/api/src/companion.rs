//! Companion provisioning backed by the meeting-bot platform.

use crate::{
    meeting::MeetingContext,
    persona::{CompanionProvisioner, PersonaDirectory, ProvisionerFactory},
    recall::{BotRequest, RecallClient, RecallError, bot_id},
};
use anyhow::Context;
use async_trait::async_trait;
use huddle_core::PersonaProfile;
use std::sync::{Arc, Weak};
use tracing::{error, info, warn};

/// Hands out one `RecallCompanion` per persona that can add its companion.
pub struct RecallProvisioning {
    pub recall: Arc<RecallClient>,
    pub meeting: MeetingContext,
    pub webhook_url: String,
    /// Camera page base; the persona id and `.html` are appended.
    pub public_base_url: String,
}

impl ProvisionerFactory for RecallProvisioning {
    fn for_companion(
        &self,
        directory: Weak<PersonaDirectory>,
        companion: Arc<PersonaProfile>,
    ) -> Arc<dyn CompanionProvisioner> {
        Arc::new(RecallCompanion {
            directory,
            camera_url: format!("{}/{}.html", self.public_base_url, companion.id),
            companion,
            recall: self.recall.clone(),
            meeting: self.meeting.clone(),
            webhook_url: self.webhook_url.clone(),
        })
    }
}

/// Sends the companion's bot into the current meeting, then starts its session.
pub struct RecallCompanion {
    directory: Weak<PersonaDirectory>,
    companion: Arc<PersonaProfile>,
    recall: Arc<RecallClient>,
    meeting: MeetingContext,
    webhook_url: String,
    camera_url: String,
}

#[async_trait]
impl CompanionProvisioner for RecallCompanion {
    async fn provision_companion(&self) -> anyhow::Result<bool> {
        let meeting_url = self
            .meeting
            .url()
            .context("No meeting URL has been set yet")?;
        let request = BotRequest::new(
            &meeting_url,
            &self.companion.display_name,
            &self.webhook_url,
            &self.camera_url,
        );

        let record = match self.recall.create_bot(&request).await {
            Ok(record) => record,
            Err(RecallError::Status { status, body }) => {
                warn!(%status, %body, companion = %self.companion.id, "Companion bot was refused");
                return Ok(false);
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(id) = bot_id(&record) {
            let active = self.meeting.track_bot(id);
            info!(active, "Companion bot added to meeting");
        }

        let directory = self
            .directory
            .upgrade()
            .context("Persona directory is shutting down")?;
        if let Err(e) = directory.ensure_started(&self.companion.id).await {
            // The bot is in the meeting; its session will connect on first message.
            error!(error = %e, companion = %self.companion.id, "Companion session failed to start");
        }
        Ok(true)
    }
}
