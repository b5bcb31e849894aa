//! One persona's live voice session.
//!
//! A `PersonaSession` owns the socket to the voice model, a background task
//! that reads the model's frames, and the persona's turn state. While the
//! model is speaking, incoming text is dropped instead of queued. Finished
//! turns are transcribed into the shared log and, for personas that relay,
//! forwarded to the companion persona when they mention it.

use super::error::{SendOutcome, SessionError};
use super::tools::ToolBridge;
use gemini_realtime::{
    ClientMessage, LiveConfig, LiveReceiver, LiveSender, ServerContent, ServerFrame, Setup,
    ToolCall,
};
use huddle_core::conversation::compose_message;
use huddle_core::{BroadcastSink, ConversationLog, PersonaProfile, UiEvent, Utterance};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, MutexGuard, RwLock, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Delays around the end of a model turn.
#[derive(Debug, Clone, Copy)]
pub struct TurnTimings {
    /// Pause between the turn-complete marker and leaving the speaking state.
    pub settle: Duration,
    /// Wait before a relayed turn is handed to the companion.
    pub relay_delay: Duration,
}

impl Default for TurnTimings {
    fn default() -> Self {
        Self {
            settle: Duration::from_millis(500),
            relay_delay: Duration::from_secs(5),
        }
    }
}

pub struct PersonaSession {
    profile: Arc<PersonaProfile>,
    live: LiveConfig,
    model: String,
    log: ConversationLog,
    sink: Arc<dyn BroadcastSink>,
    tools: ToolBridge,
    timings: TurnTimings,
    sender: Mutex<Option<Arc<LiveSender>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    connect_lock: Mutex<()>,
    connected: AtomicBool,
    speaking: AtomicBool,
    transcription: std::sync::Mutex<String>,
    companion: RwLock<Option<Weak<PersonaSession>>>,
}

impl PersonaSession {
    pub fn new(
        profile: Arc<PersonaProfile>,
        live: LiveConfig,
        model: impl Into<String>,
        log: ConversationLog,
        sink: Arc<dyn BroadcastSink>,
        tools: ToolBridge,
    ) -> Self {
        Self {
            profile,
            live,
            model: model.into(),
            log,
            sink,
            tools,
            timings: TurnTimings::default(),
            sender: Mutex::new(None),
            listener: Mutex::new(None),
            connect_lock: Mutex::new(()),
            connected: AtomicBool::new(false),
            speaking: AtomicBool::new(false),
            transcription: std::sync::Mutex::new(String::new()),
            companion: RwLock::new(None),
        }
    }

    pub fn with_timings(mut self, timings: TurnTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn profile(&self) -> &PersonaProfile {
        &self.profile
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    pub async fn has_connection(&self) -> bool {
        self.sender.lock().await.is_some()
    }

    /// Links the persona that finished turns may be relayed to.
    pub fn set_companion(&self, companion: &Arc<PersonaSession>) {
        let mut slot = self.companion.write().unwrap_or_else(|e| e.into_inner());
        *slot = Some(Arc::downgrade(companion));
    }

    fn companion(&self) -> Option<Weak<PersonaSession>> {
        self.companion
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn transcription(&self) -> MutexGuard<'_, String> {
        self.transcription.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bot_type(&self) -> String {
        self.profile.id.to_string()
    }

    fn setup(&self) -> Setup {
        Setup::new(&self.model, self.profile.instructions.clone())
            .with_temperature(self.profile.temperature)
            .with_voice(self.profile.voice.clone())
            .with_tools(self.tools.declarations())
    }

    /// Opens a fresh live session, replacing any previous one.
    pub async fn connect(self: &Arc<Self>) -> Result<(), SessionError> {
        let _guard = self.connect_lock.lock().await;
        self.connect_locked().await
    }

    /// Connects unless a live connection already exists. Concurrent callers
    /// share the connection the first of them opens.
    pub async fn ensure_connected(self: &Arc<Self>) -> Result<(), SessionError> {
        let _guard = self.connect_lock.lock().await;
        if self.is_live().await {
            return Ok(());
        }
        self.connect_locked().await
    }

    async fn is_live(&self) -> bool {
        self.is_connected()
            && self
                .sender
                .lock()
                .await
                .as_ref()
                .is_some_and(|sender| !sender.is_closed())
    }

    /// Caller holds `connect_lock`.
    async fn connect_locked(self: &Arc<Self>) -> Result<(), SessionError> {
        self.teardown().await;

        let (sender, receiver) = gemini_realtime::connect(&self.live, &self.setup())
            .await
            .map_err(|source| SessionError::Connect {
                persona: self.bot_type(),
                source,
            })?;
        let sender = Arc::new(sender);
        *self.sender.lock().await = Some(sender.clone());
        self.connected.store(true, Ordering::SeqCst);

        let span = info_span!("persona", persona = %self.profile.id);
        let handle = tokio::spawn(self.clone().listen(receiver, sender).instrument(span));
        *self.listener.lock().await = Some(handle);

        info!(persona = %self.profile.id, voice = %self.profile.voice, "Persona session connected");
        self.sink
            .send_to_all(UiEvent::Status {
                connected: true,
                bot_type: self.bot_type(),
            })
            .await;
        Ok(())
    }

    /// Stops the listener and closes the socket. Safe to call repeatedly.
    pub async fn close(&self) {
        let _guard = self.connect_lock.lock().await;
        let had_connection = self.teardown().await;
        if had_connection {
            info!(persona = %self.profile.id, "Persona session closed");
            self.sink
                .send_to_all(UiEvent::Status {
                    connected: false,
                    bot_type: self.bot_type(),
                })
                .await;
        }
    }

    /// Returns whether there was a connection to tear down.
    async fn teardown(&self) -> bool {
        if let Some(handle) = self.listener.lock().await.take() {
            handle.abort();
            if let Err(e) = handle.await {
                if !e.is_cancelled() {
                    warn!(persona = %self.profile.id, error = %e, "Listener task failed");
                }
            }
        }
        let sender = self.sender.lock().await.take();
        if let Some(sender) = &sender {
            sender.close().await;
        }
        self.connected.store(false, Ordering::SeqCst);
        self.speaking.store(false, Ordering::SeqCst);
        self.transcription().clear();
        sender.is_some()
    }

    /// Sends text to the model with recent conversation context prepended.
    ///
    /// Connects first when needed. Text arriving while the model is speaking is
    /// dropped and reported as `SkippedSpeaking`.
    pub async fn send_text(self: &Arc<Self>, text: &str) -> Result<SendOutcome, SessionError> {
        if !self.is_connected() {
            info!(persona = %self.profile.id, "Not connected, attempting to connect");
            if let Err(e) = self.ensure_connected().await {
                error!(error = %e, "Could not connect before sending");
                return Ok(SendOutcome::NoConnection);
            }
        }

        let Some(sender) = self.sender.lock().await.clone() else {
            warn!(persona = %self.profile.id, "No connection available");
            return Ok(SendOutcome::NoConnection);
        };
        if sender.is_closed() {
            warn!(persona = %self.profile.id, "Connection is closed");
            self.connected.store(false, Ordering::SeqCst);
            return Ok(SendOutcome::NoConnection);
        }

        if self.is_speaking() {
            info!(persona = %self.profile.id, "Model is speaking, skipping input");
            return Ok(SendOutcome::SkippedSpeaking);
        }

        let window = self
            .log
            .append_with_window(Utterance::user_text(text), self.profile.context_window);
        let message = compose_message(&window, &self.profile.context_label, text);
        debug!(persona = %self.profile.id, context_entries = window.len(), %message, "Sending text");

        if let Err(source) = sender.send(&ClientMessage::text(message)).await {
            self.connected.store(false, Ordering::SeqCst);
            return Err(SessionError::Send {
                persona: self.bot_type(),
                source,
            });
        }
        Ok(SendOutcome::Sent)
    }

    async fn listen(self: Arc<Self>, mut receiver: LiveReceiver, sender: Arc<LiveSender>) {
        info!("Listening for model responses");
        while let Some(frame) = receiver.next_frame().await {
            match frame {
                Ok(ServerFrame::ToolCall(call)) => self.handle_tool_call(call, &sender).await,
                Ok(ServerFrame::Content(content)) => self.handle_content(content).await,
                Ok(ServerFrame::SetupComplete) => debug!("Setup complete"),
                Ok(ServerFrame::Error(err)) => error!(error = %err, "Model reported an error"),
                Ok(ServerFrame::Unknown) => debug!("Ignoring unrecognized frame"),
                Err(e) => warn!(error = %e, "Skipping undecodable frame"),
            }
        }

        info!("Model connection closed");
        self.connected.store(false, Ordering::SeqCst);
        if self.speaking.swap(false, Ordering::SeqCst) {
            self.notify_speaking(false).await;
        }
        self.sink
            .send_to_all(UiEvent::Status {
                connected: false,
                bot_type: self.bot_type(),
            })
            .await;
    }

    async fn handle_tool_call(&self, call: ToolCall, sender: &LiveSender) {
        let responses = self.tools.dispatch(call.function_calls).await;
        if responses.is_empty() {
            return;
        }
        let count = responses.len();
        match sender.send(&ClientMessage::tool_response(responses)).await {
            Ok(()) => info!(count, "Sent tool responses"),
            Err(e) => error!(error = %e, "Failed to send tool responses"),
        }
    }

    async fn handle_content(&self, content: ServerContent) {
        if let Some(fragment) = content.transcription() {
            self.transcription().push_str(fragment);
        }

        for part in content.parts() {
            if let Some(data) = part.audio() {
                if !self.speaking.swap(true, Ordering::SeqCst) {
                    self.notify_speaking(true).await;
                }
                self.sink
                    .send_to_all(UiEvent::Audio {
                        data: data.to_string(),
                        bot_type: self.bot_type(),
                    })
                    .await;
            } else if let Some(text) = &part.text {
                debug!(%text, "Model text part");
            }
        }

        if content.interrupted {
            debug!("Model turn interrupted");
        }
        if content.turn_complete {
            self.finish_turn().await;
        }
    }

    async fn finish_turn(&self) {
        let transcript = std::mem::take(&mut *self.transcription());
        let transcript = transcript.trim();
        if !transcript.is_empty() {
            self.log.append(Utterance::model_audio(transcript));
            info!(%transcript, "Model turn complete");
        }

        tokio::time::sleep(self.timings.settle).await;
        if self.speaking.swap(false, Ordering::SeqCst) {
            self.notify_speaking(false).await;
        }

        if !transcript.is_empty() && self.profile.relay_to_companion {
            self.relay(transcript);
        }
    }

    /// Forwards a finished turn to the companion when it was addressed.
    ///
    /// Best-effort: the companion may itself be speaking by the time the relay
    /// fires, in which case it drops the text.
    fn relay(&self, transcript: &str) {
        let Some(companion) = self.companion() else {
            return;
        };
        let mentioned = companion
            .upgrade()
            .is_some_and(|c| c.profile.is_mentioned_in(transcript));
        if !mentioned {
            return;
        }

        let message = format!("{} said: {}", self.profile.display_name, transcript);
        let delay = self.timings.relay_delay;
        info!(delay_ms = delay.as_millis() as u64, "Relaying turn to companion");
        tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                let Some(companion) = companion.upgrade() else {
                    return;
                };
                match companion.send_text(&message).await {
                    Ok(outcome) => info!(?outcome, to = %companion.profile.id, "Relayed turn"),
                    Err(e) => error!(error = %e, "Relay to companion failed"),
                }
            }
            .in_current_span(),
        );
    }

    async fn notify_speaking(&self, speaking: bool) {
        self.sink
            .send_to_all(UiEvent::ModelSpeaking {
                speaking,
                bot_type: self.bot_type(),
            })
            .await;
    }
}
