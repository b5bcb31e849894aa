//! Error types for the Gemini Live transport.

use tokio_tungstenite::tungstenite;

/// Result type for transport operations.
pub type Result<T> = std::result::Result<T, LiveError>;

/// Errors raised while connecting to, talking to, or reading from a live session.
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Timed out while {0}")]
    Timeout(&'static str),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// The setup acknowledgement carried an `error` field.
    #[error("Setup rejected by server: {0}")]
    SetupRejected(String),

    #[error("Malformed setup acknowledgement: {0}")]
    MalformedAck(String),

    #[error("Connection closed")]
    Closed,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl LiveError {
    /// Whether this error came out of the connect/setup handshake.
    pub fn is_setup_failure(&self) -> bool {
        matches!(
            self,
            Self::InvalidEndpoint(_) | Self::Timeout(_) | Self::SetupRejected(_) | Self::MalformedAck(_)
        )
    }
}
