//! Subscription client: one socket, many subscriptions.

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, Stream, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::dispatch;
use super::handshake::{self, SubscriptionConfig, WsStream};
use super::message::{Frame, Payload};
use super::registry::{SubscriberId, SubscriberRegistry};
use super::state::{ConnectionState, ConnectionStatus};
use crate::error::{NetworkError, Result};
use crate::graphql::{GraphQLRequest, GraphQLResponse};

/// An item delivered on a subscription.
#[derive(Debug, Clone, PartialEq)]
pub enum SubscriptionMessage {
    /// A `data` frame payload, usually `{"data": ..., "errors": [...]}`.
    Data(Payload),
    /// An `error` frame payload.
    Error(Payload),
}

impl SubscriptionMessage {
    /// The raw payload.
    pub fn payload(&self) -> &Payload {
        match self {
            Self::Data(payload) | Self::Error(payload) => payload,
        }
    }

    /// Whether the server sent an `error` frame.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Decode a `data` payload as a GraphQL response.
    ///
    /// GraphQL errors inside the payload stay in [`GraphQLResponse::errors`];
    /// an `error` frame is returned as [`NetworkError::Request`].
    pub fn into_response(self) -> Result<GraphQLResponse> {
        match self {
            Self::Data(payload) => payload.to_response(),
            Self::Error(payload) => Err(NetworkError::Request(format!(
                "subscription error: {payload}"
            ))),
        }
    }
}

#[derive(Serialize)]
struct StartPayload<'a> {
    query: &'a str,
    variables: Option<&'a Value>,
    #[serde(rename = "operationName", skip_serializing_if = "Option::is_none")]
    operation_name: Option<&'a str>,
}

impl<'a> From<&'a GraphQLRequest> for StartPayload<'a> {
    fn from(request: &'a GraphQLRequest) -> Self {
        Self {
            query: &request.query,
            variables: request.variables.as_ref(),
            operation_name: request.operation_name.as_deref(),
        }
    }
}

struct SubscriptionInner {
    config: SubscriptionConfig,
    registry: Arc<SubscriberRegistry>,
    status: Arc<Mutex<ConnectionStatus>>,
    writer: tokio::sync::Mutex<SplitSink<WsStream, Message>>,
    dispatch: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl SubscriptionInner {
    /// Serialize and write one frame. Every socket write goes through here.
    async fn send(&self, frame: &Frame) -> Result<()> {
        let text = frame.to_text()?;
        let mut writer = self.writer.lock().await;
        writer.send(Message::Text(text.into())).await?;
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        self.status.lock().state()
    }

    /// Remove a subscriber. Returns whether `stop` should be sent for it.
    fn detach(&self, id: SubscriberId) -> bool {
        if self.registry.remove(id).is_none() {
            // Already completed or stopped.
            return false;
        }
        tracing::debug!(target: "horizon_lattice_graphql::subscription", %id, "Stopping subscription");
        self.state().is_running()
    }

    async fn stop(&self, id: SubscriberId) -> Result<()> {
        if !self.detach(id) {
            return Ok(());
        }
        self.send(&Frame::stop(id)).await
    }
}

impl Drop for SubscriptionInner {
    fn drop(&mut self) {
        if let Some(handle) = self.dispatch.get_mut().take() {
            handle.abort();
        }
        self.registry.close_all();
    }
}

/// A client for GraphQL subscriptions over a single WebSocket.
///
/// The client performs the `graphql-ws` handshake on [`connect`](Self::connect),
/// then multiplexes any number of subscriptions over that socket. A single
/// background task reads the socket and routes each frame to its
/// subscription; all writes are serialized behind one lock.
///
/// Cloning the client is cheap and shares the connection. A lost
/// connection is terminal: every open [`Subscription`] ends and new calls to
/// [`subscribe`](Self::subscribe) fail with [`NetworkError::Closed`].
///
/// # Example
///
/// ```ignore
/// use horizon_lattice_graphql::{GraphQLRequest, SubscriptionClient, SubscriptionConfig};
///
/// let client = SubscriptionClient::connect(
///     SubscriptionConfig::new("wss://api.example.com/graphql")
///         .header("Authorization", "Bearer token"),
/// )
/// .await?;
///
/// let mut messages = client
///     .subscribe(GraphQLRequest::subscription("subscription { messageAdded { id } }"))
///     .await?;
///
/// while let Some(message) = messages.recv().await {
///     let response = message.into_response()?;
///     println!("{:?}", response.data);
/// }
///
/// client.close().await?;
/// ```
#[derive(Clone)]
pub struct SubscriptionClient {
    inner: Arc<SubscriptionInner>,
}

impl SubscriptionClient {
    /// Dial the endpoint, complete the handshake and start the dispatch loop.
    ///
    /// Fails with [`NetworkError::HandshakeRejected`] if the server answers
    /// `connection_error`, [`NetworkError::ProtocolViolation`] for any other
    /// reply, and [`NetworkError::Transport`] / [`NetworkError::Timeout`]
    /// when the socket cannot be used.
    pub async fn connect(config: SubscriptionConfig) -> Result<Self> {
        let ws = handshake::connect(&config).await?;
        Ok(Self::start(ws, config))
    }

    /// Take over an acknowledged socket and spawn the dispatch loop.
    fn start(ws: WsStream, config: SubscriptionConfig) -> Self {
        let mut status = ConnectionStatus::default();
        status.advance(ConnectionState::Acknowledged);

        let (writer, reader) = ws.split();
        let registry = Arc::new(SubscriberRegistry::new());
        status.advance(ConnectionState::Running);
        let status = Arc::new(Mutex::new(status));

        let handle = tokio::spawn(dispatch::run(reader, registry.clone(), status.clone()));

        Self {
            inner: Arc::new(SubscriptionInner {
                config,
                registry,
                status,
                writer: tokio::sync::Mutex::new(writer),
                dispatch: tokio::sync::Mutex::new(Some(handle)),
                next_id: AtomicU64::new(0),
            }),
        }
    }

    /// Get the endpoint URL.
    pub fn url(&self) -> &str {
        &self.inner.config.url
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Check if new subscriptions can be started.
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// The transport failure that ended the connection, if it did not end cleanly.
    pub fn error(&self) -> Option<NetworkError> {
        self.inner.status.lock().error().cloned()
    }

    /// Number of subscriptions currently registered.
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.len()
    }

    /// Start a subscription.
    ///
    /// The subscription is registered before `start` is written, so no
    /// reply can arrive ahead of it. If the write fails the registration is
    /// rolled back and the error returned.
    pub async fn subscribe(&self, request: GraphQLRequest) -> Result<Subscription> {
        if !self.is_running() {
            return Err(NetworkError::Closed);
        }

        let payload = Payload::from_serialize(&StartPayload::from(&request))?;
        let id = SubscriberId::from_raw(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        let (sink, receiver) = mpsc::channel(self.inner.config.buffer_size.max(1));
        self.inner.registry.insert(id, sink)?;

        if let Err(err) = self.inner.send(&Frame::start(id, payload)).await {
            self.inner.registry.remove(id);
            return Err(err);
        }

        tracing::debug!(target: "horizon_lattice_graphql::subscription", %id, "Subscription started");

        Ok(Subscription {
            id,
            receiver,
            client: Arc::downgrade(&self.inner),
        })
    }

    /// Stop a subscription. Same as [`Subscription::stop`].
    pub async fn unsubscribe(&self, subscription: &mut Subscription) -> Result<()> {
        subscription.stop().await
    }

    /// Close the connection.
    ///
    /// Sends `connection_terminate`, waits for the dispatch loop to exit
    /// (aborting it after the configured close timeout), then closes the
    /// socket. Every open subscription has ended when this returns.
    /// Closing an already closed client succeeds without sending anything.
    pub async fn close(&self) -> Result<()> {
        let mut dispatch = self.inner.dispatch.lock().await;
        let Some(mut handle) = dispatch.take() else {
            return Ok(());
        };

        let terminate = self.inner.status.lock().advance(ConnectionState::Terminating);
        if terminate {
            tracing::debug!(target: "horizon_lattice_graphql::subscription", url = %self.inner.config.url, "Terminating connection");
            if let Err(err) = self.inner.send(&Frame::connection_terminate()).await {
                tracing::debug!(target: "horizon_lattice_graphql::subscription", error = %err, "Failed to send connection_terminate");
            }
        }

        match tokio::time::timeout(self.inner.config.close_timeout, &mut handle).await {
            Ok(_) => {}
            Err(_) => {
                tracing::warn!(target: "horizon_lattice_graphql::subscription", "Server did not close the connection in time; aborting");
                handle.abort();
                let _ = handle.await;
            }
        }

        self.inner.registry.close_all();
        self.inner.status.lock().advance(ConnectionState::Closed);

        let mut writer = self.inner.writer.lock().await;
        if let Err(err) = writer.close().await {
            tracing::trace!(target: "horizon_lattice_graphql::subscription", error = %err, "Socket already closed");
        }
        Ok(())
    }
}

impl std::fmt::Debug for SubscriptionClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionClient")
            .field("url", &self.inner.config.url)
            .field("state", &self.state())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

/// The receiving end of one subscription.
///
/// Yields [`SubscriptionMessage`]s in the order the server sent them and
/// ends (`None`) when the server sends `complete`, when the subscription is
/// stopped, or when the connection goes away. Also usable as a
/// [`Stream`].
pub struct Subscription {
    id: SubscriberId,
    receiver: mpsc::Receiver<SubscriptionMessage>,
    client: Weak<SubscriptionInner>,
}

impl Subscription {
    /// Get the subscription ID.
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Get the next message, or `None` once the subscription has ended.
    pub async fn recv(&mut self) -> Option<SubscriptionMessage> {
        self.receiver.recv().await
    }

    /// Stop the subscription.
    ///
    /// The subscription is removed and closed locally right away, then
    /// `stop` is sent to the server. Messages already buffered can still be
    /// read; after them the subscription ends. A `complete` the server sends
    /// afterwards is ignored. Stopping twice is a no-op, and dropping a
    /// stopped subscription sends nothing more.
    pub async fn stop(&mut self) -> Result<()> {
        self.receiver.close();
        match self.client.upgrade() {
            Some(inner) => inner.stop(self.id).await,
            None => Ok(()),
        }
    }
}

/// Dropping a live subscription removes it at once and sends `stop` in the
/// background.
impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.client.upgrade() else {
            return;
        };
        if !inner.detach(self.id) {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let id = self.id;
        runtime.spawn(async move {
            if let Err(err) = inner.send(&Frame::stop(id)).await {
                tracing::debug!(target: "horizon_lattice_graphql::subscription", %id, error = %err, "Failed to send stop for dropped subscription");
            }
        });
    }
}

impl Stream for Subscription {
    type Item = SubscriptionMessage;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().receiver.poll_recv(cx)
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
