//! GraphQL client for Horizon Lattice.
//!
//! - **HTTP**: queries and mutations as JSON or multipart POSTs, with file
//!   uploads and per-request headers
//! - **Subscriptions**: the `graphql-ws` protocol over a single WebSocket,
//!   with any number of subscriptions multiplexed on it
//!
//! # Queries
//!
//! ```ignore
//! use horizon_lattice_graphql::{GraphQLClient, GraphQLRequest};
//!
//! let client = GraphQLClient::new("https://api.example.com/graphql")
//!     .bearer_auth("token")
//!     .build()?;
//!
//! #[derive(serde::Deserialize)]
//! struct Me { me: User }
//!
//! let me: Me = client.run(GraphQLRequest::query("{ me { id name } }")).await?;
//! ```
//!
//! # Subscriptions
//!
//! ```ignore
//! use futures_util::StreamExt;
//! use horizon_lattice_graphql::{GraphQLRequest, SubscriptionClient, SubscriptionConfig};
//!
//! let client = SubscriptionClient::connect(
//!     SubscriptionConfig::new("wss://api.example.com/graphql")
//!         .init_payload(serde_json::json!({ "token": "secret" })),
//! )
//! .await?;
//!
//! let mut events = client
//!     .subscribe(GraphQLRequest::subscription("subscription { events { id } }"))
//!     .await?;
//!
//! while let Some(message) = events.next().await {
//!     let response = message.into_response()?;
//!     println!("{:?}", response.data);
//! }
//!
//! client.close().await?;
//! ```
//!
//! A subscription ends when the server sends `complete`, when it is
//! stopped, or when the connection goes away. [`SubscriptionClient::error`]
//! tells a transport failure apart from a clean close.
//!
//! # Logging
//!
//! The crate logs through `tracing` under the
//! `horizon_lattice_graphql::graphql` and
//! `horizon_lattice_graphql::subscription` targets.

mod error;
pub mod graphql;
pub mod subscription;

pub use error::{NetworkError, Result};

// Re-export commonly used types at the crate root
pub use graphql::{
    GraphQLClient, GraphQLClientBuilder, GraphQLError, GraphQLRequest, GraphQLResponse,
    OperationType, UploadFile,
};
pub use subscription::{
    ConnectionState, Frame, MessageKind, Payload, SubscriberId, Subscription, SubscriptionClient,
    SubscriptionConfig, SubscriptionMessage,
};
