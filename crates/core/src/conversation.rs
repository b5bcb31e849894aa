//! Shared Conversation Log
//!
//! An ordered, append-only record of everything the personas were sent and
//! everything they said. Each outbound message carries a short window of this
//! history because the live sessions are not relied on to remember earlier turns.

use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UtteranceKind {
    TextInput,
    AudioResponse,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub role: Role,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: UtteranceKind,
}

impl Utterance {
    /// Text a persona was asked to respond to.
    pub fn user_text(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            kind: UtteranceKind::TextInput,
        }
    }

    /// Transcript of something a persona said.
    pub fn model_audio(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
            kind: UtteranceKind::AudioResponse,
        }
    }
}

/// Cheaply clonable handle to the shared log.
#[derive(Clone, Debug, Default)]
pub struct ConversationLog {
    entries: Arc<RwLock<Vec<Utterance>>>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock cannot leave a half-appended entry behind.
    fn read(&self) -> RwLockReadGuard<'_, Vec<Utterance>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Utterance>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends an entry and returns the new length.
    pub fn append(&self, utterance: Utterance) -> usize {
        let mut entries = self.write();
        entries.push(utterance);
        entries.len()
    }

    /// Appends `utterance` and returns up to `size` entries that precede it.
    ///
    /// Both happen under one lock, so the window never contains the new entry
    /// nor anything another persona appended after it.
    pub fn append_with_window(&self, utterance: Utterance, size: usize) -> Vec<Utterance> {
        let mut entries = self.write();
        let end = entries.len();
        let window = entries[end.saturating_sub(size)..end].to_vec();
        entries.push(utterance);
        window
    }

    /// Up to `size` most recent entries, excluding the very last one, oldest first.
    pub fn window(&self, size: usize) -> Vec<Utterance> {
        let entries = self.read();
        let end = entries.len().saturating_sub(1);
        entries[end.saturating_sub(size)..end].to_vec()
    }

    pub fn snapshot(&self) -> Vec<Utterance> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}

/// Renders a context window as `"<Label>: <content>"` lines.
///
/// `model_label` names the persona whose turns appear in the window.
pub fn render_context(window: &[Utterance], model_label: &str) -> Option<String> {
    let lines: Vec<String> = window
        .iter()
        .filter(|u| matches!(u.kind, UtteranceKind::TextInput | UtteranceKind::AudioResponse))
        .map(|u| {
            let label = match u.role {
                Role::User => "User",
                Role::Model => model_label,
            };
            format!("{}: {}", label, u.content)
        })
        .collect();
    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// Builds the outbound message: the raw text, wrapped with its context when there is any.
pub fn compose_message(window: &[Utterance], model_label: &str, text: &str) -> String {
    match render_context(window, model_label) {
        Some(context) => format!(
            "[Previous conversation context]:\n{}\n\n[Current message]:\n{}",
            context, text
        ),
        None => text.to_string(),
    }
}
