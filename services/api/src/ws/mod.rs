//! UI WebSocket
//!
//! - `connections`: the observer registry personas broadcast through.
//! - `session`: the per-socket lifecycle behind `GET /ws`.

pub mod connections;
pub mod session;

pub use connections::ConnectionManager;
pub use session::ws_handler;
