//! Inbound dispatch loop.
//!
//! The loop is the only reader of the socket. It routes `data`, `error` and
//! `complete` frames to subscribers and, when the connection ends for any
//! reason, closes every outstanding subscriber before it returns.

use std::io;
use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::SplitStream;
use parking_lot::Mutex;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use super::client::SubscriptionMessage;
use super::handshake::WsStream;
use super::message::{Frame, MessageKind, Payload};
use super::registry::SubscriberRegistry;
use super::state::{ConnectionState, ConnectionStatus};
use crate::error::NetworkError;

/// Run until the connection ends.
///
/// A clean end of stream closes all subscribers normally. Any other read
/// error is recorded in `status` as a transport failure; subscribers are
/// closed the same way.
pub(crate) async fn run(
    mut read: SplitStream<WsStream>,
    registry: Arc<SubscriberRegistry>,
    status: Arc<Mutex<ConnectionStatus>>,
) {
    let failure = loop {
        let message = match read.next().await {
            Some(Ok(message)) => message,
            Some(Err(err)) if is_end_of_stream(&err) => {
                tracing::debug!(target: "horizon_lattice_graphql::subscription", error = %err, "Connection ended");
                break None;
            }
            Some(Err(err)) => break Some(NetworkError::from(err)),
            None => break None,
        };

        let frame = match message {
            Message::Text(text) => Frame::parse(&text),
            Message::Binary(bytes) => Frame::from_slice(&bytes),
            Message::Close(close) => {
                tracing::debug!(target: "horizon_lattice_graphql::subscription", ?close, "Server closed the connection");
                break None;
            }
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
        };

        match frame {
            Ok(frame) => route(frame, &registry).await,
            Err(err) => {
                tracing::warn!(target: "horizon_lattice_graphql::subscription", error = %err, "Dropping malformed frame");
            }
        }
    };

    let closed = registry.close_all();
    match failure {
        Some(err) => {
            tracing::error!(target: "horizon_lattice_graphql::subscription", error = %err, closed, "Subscription connection failed");
            status.lock().fail(err);
        }
        None => {
            tracing::debug!(target: "horizon_lattice_graphql::subscription", closed, "Subscription connection closed");
            status.lock().advance(ConnectionState::Closed);
        }
    }
}

/// Read errors that mean "the peer went away" rather than a fault.
fn is_end_of_stream(err: &WsError) -> bool {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => true,
        WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        WsError::Io(e) => e.kind() == io::ErrorKind::UnexpectedEof,
        _ => false,
    }
}

async fn route(frame: Frame, registry: &SubscriberRegistry) {
    match frame.kind {
        MessageKind::Data | MessageKind::Error => deliver(frame, registry).await,
        MessageKind::Complete => match frame.subscriber_id() {
            Some(id) if registry.remove(id).is_some() => {
                tracing::debug!(target: "horizon_lattice_graphql::subscription", %id, "Subscription completed");
            }
            _ => {
                tracing::debug!(target: "horizon_lattice_graphql::subscription", id = ?frame.id, "complete for unknown subscriber");
            }
        },
        MessageKind::KeepAlive => {}
        other => {
            tracing::trace!(target: "horizon_lattice_graphql::subscription", kind = %other, "Ignoring frame");
        }
    }
}

async fn deliver(frame: Frame, registry: &SubscriberRegistry) {
    let target = frame
        .subscriber_id()
        .and_then(|id| registry.get(id).map(|sink| (id, sink)));
    let Some((id, sink)) = target else {
        tracing::debug!(target: "horizon_lattice_graphql::subscription", kind = %frame.kind, id = ?frame.id, "Dropping frame for unknown subscriber");
        return;
    };

    let payload = frame.payload.unwrap_or_else(Payload::null);
    let message = match frame.kind {
        MessageKind::Error => SubscriptionMessage::Error(payload),
        _ => SubscriptionMessage::Data(payload),
    };

    // Waits while the subscriber's buffer is full.
    if sink.send(message).await.is_err() {
        registry.remove(id);
        tracing::debug!(target: "horizon_lattice_graphql::subscription", %id, "Subscriber dropped its receiver");
    }
}
