//! Dialing the subscription socket and the `connection_init` exchange.

use std::collections::HashMap;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use http::{HeaderName, HeaderValue};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use super::message::{Frame, MessageKind, Payload};
use crate::error::{NetworkError, Result};

/// Sub-protocol negotiated with the server.
pub const GRAPHQL_WS_PROTOCOL: &str = "graphql-ws";

/// Type alias for a connected WebSocket stream.
pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Configuration for a subscription connection.
#[derive(Debug, Clone)]
pub struct SubscriptionConfig {
    /// WebSocket URL. `http`/`https` URLs are converted to `ws`/`wss`.
    pub url: String,
    /// Additional headers for the WebSocket upgrade request.
    pub headers: HashMap<String, String>,
    /// Payload of `connection_init`. `None` sends `{}`.
    pub init_payload: Option<Value>,
    /// Bound on dialing and on waiting for `connection_ack`.
    pub connection_timeout: Duration,
    /// How long `close()` waits for the server to end the connection
    /// before the dispatch task is aborted.
    pub close_timeout: Duration,
    /// Items buffered per subscriber before delivery blocks the connection.
    pub buffer_size: usize,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            headers: HashMap::new(),
            init_payload: None,
            connection_timeout: Duration::from_secs(30),
            close_timeout: Duration::from_secs(5),
            buffer_size: 32,
        }
    }
}

impl SubscriptionConfig {
    /// Create a configuration for the given endpoint.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Add a header to the upgrade request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Add multiple headers.
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.headers.extend(headers);
        self
    }

    /// Set the `connection_init` payload (e.g. auth tokens).
    pub fn init_payload(mut self, payload: Value) -> Self {
        self.init_payload = Some(payload);
        self
    }

    /// Set the dial and acknowledgement timeout.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set how long `close()` waits for the server.
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set the per-subscriber buffer. Zero is treated as one.
    pub fn buffer_size(mut self, size: usize) -> Self {
        self.buffer_size = size;
        self
    }

    /// The endpoint with a WebSocket scheme.
    pub fn websocket_url(&self) -> Result<Url> {
        let mut url = Url::parse(&self.url)?;
        let scheme = match url.scheme() {
            "ws" | "wss" => return Ok(url),
            "http" => "ws",
            "https" => "wss",
            other => {
                return Err(NetworkError::InvalidUrl(format!(
                    "unsupported scheme '{other}' for subscriptions"
                )));
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| NetworkError::InvalidUrl(format!("cannot use {scheme} for {url}")))?;
        Ok(url)
    }

    /// Build the upgrade request: caller headers, then the protocol headers.
    pub(crate) fn upgrade_request(&self) -> Result<Request> {
        let mut request = self.websocket_url()?.as_str().into_client_request()?;
        let headers = request.headers_mut();

        for (name, value) in &self.headers {
            headers.insert(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }
        headers.insert(
            http::header::SEC_WEBSOCKET_PROTOCOL,
            HeaderValue::from_static(GRAPHQL_WS_PROTOCOL),
        );
        headers.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );

        Ok(request)
    }

    fn connection_init(&self) -> Result<Frame> {
        let payload = match &self.init_payload {
            Some(value) => Payload::from_serialize(value)?,
            None => Payload::empty_object(),
        };
        Ok(Frame::connection_init(payload))
    }
}

/// Dial the endpoint and complete the `connection_init` / `connection_ack`
/// exchange. On any failure after dialing, the socket is closed before the
/// error is returned.
pub(crate) async fn connect(config: &SubscriptionConfig) -> Result<WsStream> {
    let request = config.upgrade_request()?;
    let uri = request.uri().clone();

    tracing::debug!(target: "horizon_lattice_graphql::subscription", %uri, "Dialing subscription endpoint");

    let (mut ws, _) = tokio::time::timeout(
        config.connection_timeout,
        tokio_tungstenite::connect_async(request),
    )
    .await
    .map_err(|_| NetworkError::Timeout)??;

    match acknowledge(&mut ws, config).await {
        Ok(()) => {
            tracing::debug!(target: "horizon_lattice_graphql::subscription", %uri, "Connection acknowledged");
            Ok(ws)
        }
        Err(err) => {
            tracing::warn!(target: "horizon_lattice_graphql::subscription", %uri, error = %err, "Handshake failed");
            let _ = ws.close(None).await;
            Err(err)
        }
    }
}

async fn acknowledge(ws: &mut WsStream, config: &SubscriptionConfig) -> Result<()> {
    let init = config.connection_init()?.to_text()?;
    ws.send(Message::Text(init.into())).await?;

    let reply = tokio::time::timeout(config.connection_timeout, read_frame(ws))
        .await
        .map_err(|_| NetworkError::Timeout)??;

    match reply.kind {
        MessageKind::ConnectionAck => Ok(()),
        MessageKind::ConnectionError => Err(NetworkError::HandshakeRejected {
            payload: reply.payload.unwrap_or_else(Payload::null),
        }),
        other => Err(NetworkError::ProtocolViolation(format!(
            "expected connection_ack, got {other}"
        ))),
    }
}

/// Read the next protocol frame, skipping WebSocket control messages.
async fn read_frame(ws: &mut WsStream) -> Result<Frame> {
    loop {
        let message = match ws.next().await {
            Some(message) => message?,
            None => {
                return Err(NetworkError::Transport(
                    "connection closed during handshake".into(),
                ));
            }
        };

        let frame = match message {
            Message::Text(text) => Frame::parse(&text),
            Message::Binary(bytes) => Frame::from_slice(&bytes),
            Message::Close(_) => {
                return Err(NetworkError::Transport(
                    "server closed the connection during handshake".into(),
                ));
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        };

        return frame.map_err(|e| {
            NetworkError::ProtocolViolation(format!("malformed handshake reply: {e}"))
        });
    }
}
