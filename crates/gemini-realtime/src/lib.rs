//! Minimal client for the Gemini Live bidirectional streaming API.
//!
//! - `protocol`: outbound and inbound frame types.
//! - `connection`: socket setup, the setup handshake and the two socket halves.
//! - `error`: the transport error type.

pub mod connection;
pub mod error;
pub mod protocol;

pub use connection::{LiveConfig, LiveReceiver, LiveSender, connect};
pub use error::{LiveError, Result};
pub use protocol::{
    ClientMessage, FunctionCall, FunctionDeclaration, FunctionResponse, ServerContent, ServerFrame,
    Setup, ToolCall,
};
