//! Persona directory: the profiles this service knows and the sessions started for them.

use super::error::{DirectoryError, SendOutcome};
use super::session::{PersonaSession, TurnTimings};
use super::tools::{CompanionProvisioner, ToolBridge};
use gemini_realtime::LiveConfig;
use huddle_core::{BroadcastSink, ConversationLog, MeetingTool, PersonaId, PersonaProfile, Roster};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use tracing::{error, info, warn};

/// Builds the provisioner used by a persona's `add_companion_bot` tool.
pub trait ProvisionerFactory: Send + Sync {
    fn for_companion(
        &self,
        directory: Weak<PersonaDirectory>,
        companion: Arc<PersonaProfile>,
    ) -> Arc<dyn CompanionProvisioner>;
}

/// Collaborators every session is built with.
#[derive(Clone)]
pub struct SessionDeps {
    pub live: LiveConfig,
    pub model: String,
    pub log: ConversationLog,
    pub roster: Roster,
    pub sink: Arc<dyn BroadcastSink>,
    pub timings: TurnTimings,
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct PersonaStatus {
    pub id: PersonaId,
    pub started: bool,
    pub connected: bool,
    pub speaking: bool,
}

pub struct PersonaDirectory {
    this: Weak<PersonaDirectory>,
    profiles: Vec<Arc<PersonaProfile>>,
    deps: SessionDeps,
    provisioning: Option<Arc<dyn ProvisionerFactory>>,
    sessions: RwLock<BTreeMap<PersonaId, Arc<PersonaSession>>>,
}

impl PersonaDirectory {
    pub fn new(
        profiles: Vec<PersonaProfile>,
        deps: SessionDeps,
        provisioning: Option<Arc<dyn ProvisionerFactory>>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            profiles: profiles.into_iter().map(Arc::new).collect(),
            deps,
            provisioning,
            sessions: RwLock::new(BTreeMap::new()),
        })
    }

    fn sessions(&self) -> RwLockReadGuard<'_, BTreeMap<PersonaId, Arc<PersonaSession>>> {
        self.sessions.read().unwrap_or_else(|e| e.into_inner())
    }

    fn sessions_mut(&self) -> RwLockWriteGuard<'_, BTreeMap<PersonaId, Arc<PersonaSession>>> {
        self.sessions.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn profile(&self, id: &PersonaId) -> Option<Arc<PersonaProfile>> {
        self.profiles.iter().find(|p| &p.id == id).cloned()
    }

    pub fn profiles(&self) -> &[Arc<PersonaProfile>] {
        &self.profiles
    }

    /// The first persona that starts with the service.
    pub fn primary(&self) -> Option<Arc<PersonaProfile>> {
        self.profiles.iter().find(|p| p.autostart).cloned()
    }

    /// The session for `id`, if it has been started.
    pub fn get(&self, id: &PersonaId) -> Option<Arc<PersonaSession>> {
        self.sessions().get(id).cloned()
    }

    /// Returns the session for `id`, creating and linking it if needed. Does not connect.
    pub fn session(&self, id: &PersonaId) -> Result<Arc<PersonaSession>, DirectoryError> {
        let mut sessions = self.sessions_mut();
        if let Some(existing) = sessions.get(id) {
            return Ok(existing.clone());
        }
        let profile = self
            .profile(id)
            .ok_or_else(|| DirectoryError::UnknownPersona(id.to_string()))?;
        let session = Arc::new(self.build_session(profile));

        for other in sessions.values() {
            if session.profile().companion.as_ref() == Some(&other.profile().id) {
                session.set_companion(other);
            }
            if other.profile().companion.as_ref() == Some(id) {
                other.set_companion(&session);
            }
        }
        sessions.insert(id.clone(), session.clone());
        info!(persona = %id, "Persona session created");
        Ok(session)
    }

    /// Creates the session if needed and connects it unless it already is.
    pub async fn ensure_started(
        &self,
        id: &PersonaId,
    ) -> Result<Arc<PersonaSession>, DirectoryError> {
        let session = self.session(id)?;
        session.ensure_connected().await?;
        Ok(session)
    }

    /// Starts every autostart persona. Failures are logged; the sessions stay
    /// registered and reconnect on their next message.
    pub async fn start_autostart(&self) {
        let ids: Vec<PersonaId> = self
            .profiles
            .iter()
            .filter(|p| p.autostart)
            .map(|p| p.id.clone())
            .collect();
        for id in ids {
            match self.ensure_started(&id).await {
                Ok(_) => info!(persona = %id, "Persona started"),
                Err(e) => error!(persona = %id, error = %e, "Failed to start persona"),
            }
        }
    }

    /// Sends a transcribed utterance to every started persona it mentions.
    ///
    /// Returns the personas the text was sent to.
    pub async fn route_transcript(&self, speaker: &str, text: &str) -> Vec<PersonaId> {
        let targets: Vec<Arc<PersonaSession>> = self
            .sessions()
            .values()
            .filter(|s| s.profile().is_mentioned_in(text))
            .cloned()
            .collect();
        if targets.is_empty() {
            info!(%speaker, "No persona mentioned");
            return Vec::new();
        }

        let message = format!("Speaker {speaker} said: {text}");
        let mut delivered = Vec::with_capacity(targets.len());
        for session in targets {
            let persona = session.profile().id.clone();
            match session.send_text(&message).await {
                Ok(SendOutcome::Sent) => {
                    info!(%persona, %speaker, "Routed transcript");
                    delivered.push(persona);
                }
                Ok(outcome) => warn!(%persona, ?outcome, "Transcript not delivered"),
                Err(e) => error!(%persona, error = %e, "Error routing transcript"),
            }
        }
        delivered
    }

    pub fn statuses(&self) -> Vec<PersonaStatus> {
        let sessions = self.sessions();
        self.profiles
            .iter()
            .map(|profile| {
                let session = sessions.get(&profile.id);
                PersonaStatus {
                    id: profile.id.clone(),
                    started: session.is_some(),
                    connected: session.is_some_and(|s| s.is_connected()),
                    speaking: session.is_some_and(|s| s.is_speaking()),
                }
            })
            .collect()
    }

    pub async fn shutdown(&self) {
        let sessions: Vec<Arc<PersonaSession>> = self.sessions().values().cloned().collect();
        for session in sessions {
            session.close().await;
        }
        info!("All persona sessions closed");
    }

    fn build_session(&self, profile: Arc<PersonaProfile>) -> PersonaSession {
        let companion = profile.companion.as_ref().and_then(|id| self.profile(id));
        let provisioner = match (&self.provisioning, &companion) {
            (Some(factory), Some(companion)) if profile.has_tool(MeetingTool::AddCompanion) => {
                Some(factory.for_companion(self.this.clone(), companion.clone()))
            }
            _ => None,
        };
        let companion_name = companion
            .map(|c| c.display_name.clone())
            .unwrap_or_else(|| "companion".to_string());
        let tools = ToolBridge::new(
            self.deps.roster.clone(),
            provisioner,
            profile.tools.clone(),
            companion_name,
        );

        PersonaSession::new(
            profile,
            self.deps.live.clone(),
            self.deps.model.clone(),
            self.deps.log.clone(),
            self.deps.sink.clone(),
            tools,
        )
        .with_timings(self.deps.timings)
    }
}
