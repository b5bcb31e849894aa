use gemini_realtime::LiveError;
use serde::Serialize;

/// Errors surfaced by a persona session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("failed to connect persona '{persona}': {source}")]
    Connect {
        persona: String,
        #[source]
        source: LiveError,
    },
    #[error("failed to send to persona '{persona}': {source}")]
    Send {
        persona: String,
        #[source]
        source: LiveError,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("unknown persona '{0}'")]
    UnknownPersona(String),
    #[error(transparent)]
    Session(#[from] SessionError),
}

/// What happened to a `send_text` call that did not fail outright.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SendOutcome {
    Sent,
    /// The persona was mid-turn; the text was dropped.
    SkippedSpeaking,
    /// No usable connection, even after trying to open one.
    NoConnection,
}
