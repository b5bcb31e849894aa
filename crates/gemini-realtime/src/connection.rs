//! Connection handling for a Gemini Live session.
//!
//! `connect` performs the whole handshake (socket, setup frame, acknowledgement)
//! and hands back the two halves of the socket. The socket connect and the
//! acknowledgement read each get their own `connect_timeout` window. The halves share
//! a closed-flag so the sending side learns when the reading side saw the socket go.

use crate::error::{LiveError, Result};
use crate::protocol::{ClientMessage, ServerFrame, Setup};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, client::IntoClientRequest},
};
use tracing::{debug, info, warn};
use url::Url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

pub const DEFAULT_BASE_URL: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Where and how to reach the live endpoint.
#[derive(Clone)]
pub struct LiveConfig {
    /// Full WebSocket URL, including the `key` query parameter.
    pub endpoint: String,
    /// Bounds the socket connect and, separately, the wait for the setup acknowledgement.
    pub connect_timeout: Duration,
}

impl LiveConfig {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            endpoint: endpoint_with_key(base_url, api_key),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    pub fn with_connect_timeout(mut self, connect_timeout: Duration) -> Self {
        self.connect_timeout = connect_timeout;
        self
    }
}

/// Appends the `key` query parameter. A base without a path gets `/`, which the
/// WebSocket request line needs. Unparseable bases pass through and fail in `connect`.
fn endpoint_with_key(base_url: &str, api_key: &str) -> String {
    match Url::parse(base_url) {
        Ok(mut url) => {
            if url.path().is_empty() {
                url.set_path("/");
            }
            url.query_pairs_mut().append_pair("key", api_key);
            url.into()
        }
        Err(e) => {
            warn!(error = %e, "Gemini endpoint is not a valid URL");
            format!("{base_url}?key={api_key}")
        }
    }
}

// The endpoint carries the API key, keep it out of logs.
impl fmt::Debug for LiveConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let base = self
            .endpoint
            .split_once('?')
            .map_or(self.endpoint.as_str(), |(base, _)| base);
        f.debug_struct("LiveConfig")
            .field("endpoint", &base)
            .field("connect_timeout", &self.connect_timeout)
            .finish()
    }
}

/// Opens a live session and completes the setup handshake.
///
/// On any failure the partially opened socket is closed (errors ignored) and
/// nothing is retried.
pub async fn connect(config: &LiveConfig, setup: &Setup) -> Result<(LiveSender, LiveReceiver)> {
    let request = config
        .endpoint
        .as_str()
        .into_client_request()
        .map_err(|e| LiveError::InvalidEndpoint(e.to_string()))?;

    let (ws_stream, _) = timeout(config.connect_timeout, connect_async(request))
        .await
        .map_err(|_| LiveError::Timeout("connecting"))??;
    info!(?config, "Connected to Gemini Live WebSocket.");

    let (mut sink, mut source) = ws_stream.split();
    if let Err(e) = handshake(&mut sink, &mut source, setup, config.connect_timeout).await {
        if let Err(close_err) = sink.close().await {
            debug!(error = %close_err, "Ignoring close error after failed handshake");
        }
        return Err(e);
    }

    let closed = Arc::new(AtomicBool::new(false));
    Ok((
        LiveSender {
            sink: Mutex::new(sink),
            closed: closed.clone(),
        },
        LiveReceiver { source, closed },
    ))
}

#[derive(Serialize)]
struct SetupFrame<'a> {
    setup: &'a Setup,
}

async fn handshake(
    sink: &mut WsSink,
    source: &mut WsSource,
    setup: &Setup,
    limit: Duration,
) -> Result<()> {
    let payload = serde_json::to_string(&SetupFrame { setup })?;
    debug!(raw_setup = %payload, "Sending setup message");
    sink.send(Message::Text(payload.into())).await?;

    let ack = timeout(limit, next_payload(source))
        .await
        .map_err(|_| LiveError::Timeout("awaiting setup acknowledgement"))??;
    debug!(raw_ack = %ack, "Setup acknowledgement received");
    validate_ack(&ack)
}

/// Reads the next data frame as text, skipping control frames.
async fn next_payload(source: &mut WsSource) -> Result<String> {
    loop {
        match source.next().await {
            Some(Ok(Message::Text(text))) => return Ok(text.as_str().to_owned()),
            Some(Ok(Message::Binary(bytes))) => {
                return String::from_utf8(bytes.to_vec())
                    .map_err(|e| LiveError::MalformedAck(e.to_string()));
            }
            Some(Ok(Message::Close(frame))) => {
                debug!(?frame, "Server closed the socket during setup");
                return Err(LiveError::Closed);
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(e.into()),
            None => return Err(LiveError::Closed),
        }
    }
}

/// Checks a setup acknowledgement: it must be a JSON object without an `error` key.
pub fn validate_ack(raw: &str) -> Result<()> {
    let value: Value =
        serde_json::from_str(raw).map_err(|e| LiveError::MalformedAck(e.to_string()))?;
    let Some(object) = value.as_object() else {
        return Err(LiveError::MalformedAck(
            "acknowledgement is not a JSON object".to_string(),
        ));
    };
    if let Some(error) = object.get("error") {
        return Err(LiveError::SetupRejected(error.to_string()));
    }
    Ok(())
}

/// Outbound half of a live session.
pub struct LiveSender {
    sink: Mutex<WsSink>,
    closed: Arc<AtomicBool>,
}

impl LiveSender {
    /// Sends one frame. Refuses once the socket is known to be closed.
    pub async fn send(&self, message: &ClientMessage) -> Result<()> {
        if self.is_closed() {
            return Err(LiveError::Closed);
        }
        let payload = serde_json::to_string(message)?;
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Text(payload.into())).await {
            self.closed.store(true, Ordering::SeqCst);
            return Err(e.into());
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Sends a close frame. Errors are logged and swallowed; safe to call twice.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.close().await {
            debug!(error = %e, "Ignoring error while closing Gemini socket");
        }
    }
}

/// Inbound half of a live session.
pub struct LiveReceiver {
    source: WsSource,
    closed: Arc<AtomicBool>,
}

impl LiveReceiver {
    /// Waits for the next data frame.
    ///
    /// Returns `None` once the socket is closed or fails; a frame that cannot be
    /// decoded comes back as `Some(Err(..))` and the stream stays usable.
    pub async fn next_frame(&mut self) -> Option<Result<ServerFrame>> {
        loop {
            match self.source.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Some(ServerFrame::decode(text.as_str()).map_err(LiveError::from));
                }
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => return Some(ServerFrame::decode(text).map_err(LiveError::from)),
                    Err(e) => {
                        warn!(error = %e, len = bytes.len(), "Skipping non UTF-8 binary frame");
                        continue;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Gemini WebSocket connection closed by server.");
                    self.closed.store(true, Ordering::SeqCst);
                    return None;
                }
                Some(Ok(_)) => continue,
                Some(Err(e)) => {
                    warn!(error = %e, "Error reading from Gemini WebSocket");
                    self.closed.store(true, Ordering::SeqCst);
                    return None;
                }
                None => {
                    self.closed.store(true, Ordering::SeqCst);
                    return None;
                }
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_ack() {
        assert!(validate_ack(r#"{"setupComplete":{}}"#).is_ok());
        assert!(matches!(
            validate_ack(r#"{"error":{"message":"bad model"}}"#),
            Err(LiveError::SetupRejected(msg)) if msg.contains("bad model")
        ));
        assert!(matches!(validate_ack("garbage"), Err(LiveError::MalformedAck(_))));
        assert!(matches!(validate_ack("\"ok\""), Err(LiveError::MalformedAck(_))));
    }

    #[test]
    fn test_config_debug_hides_key() {
        let config = LiveConfig::new("wss://example.test/live", "secret-key");
        assert_eq!(config.endpoint, "wss://example.test/live?key=secret-key");
        let debug = format!("{config:?}");
        assert!(debug.contains("wss://example.test/live"));
        assert!(!debug.contains("secret-key"));
    }

    #[test]
    fn test_endpoint_without_path_gets_root() {
        let config = LiveConfig::new("ws://127.0.0.1:9000", "k1");
        assert_eq!(config.endpoint, "ws://127.0.0.1:9000/?key=k1");
        assert!(config.endpoint.as_str().into_client_request().is_ok());

        let proxied = LiveConfig::new("wss://proxy.example", "k2");
        assert_eq!(proxied.endpoint, "wss://proxy.example/?key=k2");
    }

    #[test]
    fn test_endpoint_keeps_existing_query() {
        let config = LiveConfig::new("wss://example.test/live?alt=ws", "k");
        assert_eq!(config.endpoint, "wss://example.test/live?alt=ws&key=k");
    }
}
