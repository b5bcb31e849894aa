//! Test doubles shared by the integration tests: an in-process Gemini Live
//! server and a broadcast sink that records what the UI would have seen.

#![allow(dead_code)]

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use gemini_realtime::LiveConfig;
use huddle_api::persona::{PersonaSession, ToolBridge, TurnTimings};
use huddle_core::{
    BroadcastSink, ConversationLog, MeetingTool, PersonaId, PersonaProfile, Roster, UiEvent,
};
use serde_json::{Value, json};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};

pub const SETUP_OK: &str = r#"{"setupComplete":{}}"#;

pub const TEST_TIMINGS: TurnTimings = TurnTimings {
    settle: Duration::from_millis(50),
    relay_delay: Duration::from_millis(100),
};

/// A Gemini Live stand-in that accepts any number of connections, acknowledges
/// each setup with `ack`, records every frame the client sends and lets the
/// test push frames to the most recent connection.
pub struct MockGemini {
    pub url: String,
    received: mpsc::UnboundedReceiver<Value>,
    outbound: Arc<tokio::sync::Mutex<Option<mpsc::UnboundedSender<Message>>>>,
    connections: Arc<AtomicUsize>,
}

impl MockGemini {
    pub async fn start(ack: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let (received_tx, received) = mpsc::unbounded_channel();
        let outbound = Arc::new(tokio::sync::Mutex::new(None));
        let connections = Arc::new(AtomicUsize::new(0));

        let ack = ack.to_string();
        let slot = outbound.clone();
        let count = connections.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(ws) = accept_async(stream).await else {
                    continue;
                };
                count.fetch_add(1, Ordering::SeqCst);
                let (mut write, mut read) = ws.split();

                if let Some(Ok(Message::Text(setup))) = read.next().await {
                    let _ = received_tx.send(serde_json::from_str(setup.as_str()).unwrap());
                }
                let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
                *slot.lock().await = Some(out_tx);
                if write.send(Message::Text(ack.clone().into())).await.is_err() {
                    continue;
                }

                let received_tx = received_tx.clone();
                tokio::spawn(async move {
                    loop {
                        tokio::select! {
                            incoming = read.next() => match incoming {
                                Some(Ok(Message::Text(text))) => {
                                    let _ = received_tx.send(serde_json::from_str(text.as_str()).unwrap());
                                }
                                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                                Some(Ok(_)) => {}
                            },
                            Some(message) = out_rx.recv() => {
                                let closing = matches!(message, Message::Close(_));
                                if write.send(message).await.is_err() || closing {
                                    break;
                                }
                            }
                        }
                    }
                });
            }
        });

        Self {
            url,
            received,
            outbound,
            connections,
        }
    }

    pub fn live_config(&self) -> LiveConfig {
        LiveConfig::new(&self.url, "test-key").with_connect_timeout(Duration::from_millis(500))
    }

    /// Sends a frame to the most recent connection.
    pub async fn push(&self, frame: Value) {
        let slot = self.outbound.lock().await;
        let tx = slot.as_ref().expect("no client connected");
        tx.send(Message::Text(frame.to_string().into())).unwrap();
    }

    /// Closes the most recent connection from the server side.
    pub async fn hang_up(&self) {
        let slot = self.outbound.lock().await;
        if let Some(tx) = slot.as_ref() {
            let _ = tx.send(Message::Close(None));
        }
    }

    /// Next frame the client sent, failing the test after two seconds.
    pub async fn next_frame(&mut self) -> Value {
        tokio::time::timeout(Duration::from_secs(2), self.received.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("mock server stopped")
    }

    /// Next frame that is not a setup frame.
    pub async fn next_non_setup(&mut self) -> Value {
        loop {
            let frame = self.next_frame().await;
            if frame.get("setup").is_none() {
                return frame;
            }
        }
    }

    /// Whether any non-setup frame arrives within `wait`.
    pub async fn nothing_within(&mut self, wait: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            match tokio::time::timeout_at(deadline, self.received.recv()).await {
                Err(_) => return true,
                Ok(None) => return true,
                Ok(Some(frame)) if frame.get("setup").is_some() => continue,
                Ok(Some(_)) => return false,
            }
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

/// Captures everything broadcast to the UI.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<UiEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn speaking(&self, bot: &str) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::ModelSpeaking { speaking, bot_type } if bot_type == bot => Some(speaking),
                _ => None,
            })
            .collect()
    }

    pub fn statuses(&self, bot: &str) -> Vec<bool> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                UiEvent::Status {
                    connected,
                    bot_type,
                } if bot_type == bot => Some(connected),
                _ => None,
            })
            .collect()
    }

    pub fn audio_count(&self, bot: &str) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, UiEvent::Audio { bot_type, .. } if bot_type == bot))
            .count()
    }
}

#[async_trait]
impl BroadcastSink for RecordingSink {
    async fn send_to_all(&self, event: UiEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Polls `condition` until it holds, failing the test after two seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn scooby_profile() -> PersonaProfile {
    PersonaProfile {
        id: PersonaId::new("scooby"),
        display_name: "Scooby".into(),
        keyword: "scooby".into(),
        context_label: "Scooby".into(),
        voice: "Puck".into(),
        temperature: 0.0,
        context_window: 8,
        tools: MeetingTool::ALL.to_vec(),
        relay_to_companion: true,
        companion: Some(PersonaId::new("lyra")),
        autostart: true,
        instructions: "You are Scooby.".into(),
    }
}

pub fn lyra_profile() -> PersonaProfile {
    PersonaProfile {
        id: PersonaId::new("lyra"),
        display_name: "Lyra".into(),
        keyword: "lyra".into(),
        context_label: "lyra AI".into(),
        voice: "Kore".into(),
        temperature: 0.7,
        context_window: 5,
        tools: Vec::new(),
        relay_to_companion: false,
        companion: Some(PersonaId::new("scooby")),
        autostart: false,
        instructions: "You are Lyra.".into(),
    }
}

/// A standalone session (not registered in a directory) against `server`.
pub fn session(
    profile: PersonaProfile,
    server: &MockGemini,
    log: &ConversationLog,
    roster: &Roster,
    sink: &Arc<RecordingSink>,
) -> Arc<PersonaSession> {
    session_with_timings(profile, server, log, roster, sink, TEST_TIMINGS)
}

pub fn session_with_timings(
    profile: PersonaProfile,
    server: &MockGemini,
    log: &ConversationLog,
    roster: &Roster,
    sink: &Arc<RecordingSink>,
    timings: TurnTimings,
) -> Arc<PersonaSession> {
    let tools = ToolBridge::new(roster.clone(), None, profile.tools.clone(), "Lyra");
    Arc::new(
        PersonaSession::new(
            Arc::new(profile),
            server.live_config(),
            "gemini-test",
            log.clone(),
            sink.clone(),
            tools,
        )
        .with_timings(timings),
    )
}

pub fn audio(data: &str) -> Value {
    json!({"serverContent": {"modelTurn": {"parts": [
        {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": data}}
    ]}}})
}

pub fn transcription(text: &str) -> Value {
    json!({"serverContent": {"outputTranscription": {"text": text}}})
}

pub fn turn_complete() -> Value {
    json!({"serverContent": {"turnComplete": true}})
}

/// The text of a `realtimeInput` frame.
pub fn input_text(frame: &Value) -> &str {
    frame["realtimeInput"]["text"]
        .as_str()
        .unwrap_or_else(|| panic!("not a realtimeInput frame: {frame}"))
}
