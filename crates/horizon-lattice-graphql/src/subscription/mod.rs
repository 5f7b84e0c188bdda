//! GraphQL subscriptions over WebSocket.
//!
//! Implements the client side of the `graphql-ws` sub-protocol
//! (`connection_init` / `start` / `data` / `complete` / `ka`): one socket per
//! [`SubscriptionClient`], any number of [`Subscription`]s multiplexed over it.
//!
//! # Example
//!
//! ```ignore
//! use futures_util::StreamExt;
//! use horizon_lattice_graphql::subscription::{SubscriptionClient, SubscriptionConfig};
//! use horizon_lattice_graphql::GraphQLRequest;
//!
//! let client = SubscriptionClient::connect(SubscriptionConfig::new("ws://localhost:4000/graphql")).await?;
//!
//! let request = GraphQLRequest::subscription(r#"
//!     subscription OnComment($postId: ID!) {
//!         commentAdded(postId: $postId) { id body }
//!     }
//! "#)
//! .variable("postId", "42");
//!
//! let mut comments = client.subscribe(request).await?;
//! while let Some(message) = comments.next().await {
//!     println!("{}", message.payload());
//! }
//! ```
//!
//! # Delivery
//!
//! Frames for one subscription are delivered in the order they arrived.
//! Each subscription buffers up to [`SubscriptionConfig::buffer_size`]
//! messages; when a buffer is full the reader waits, which holds up every
//! other subscription on the same socket until the slow consumer catches
//! up.

mod client;
mod dispatch;
mod handshake;
mod message;
mod registry;
mod state;

pub use client::{Subscription, SubscriptionClient, SubscriptionMessage};
pub use handshake::{GRAPHQL_WS_PROTOCOL, SubscriptionConfig};
pub use message::{Frame, MessageKind, Payload};
pub use registry::SubscriberId;
pub use state::ConnectionState;
