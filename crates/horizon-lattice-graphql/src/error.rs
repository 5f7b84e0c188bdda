//! Error types for the GraphQL client.

use tokio_tungstenite::tungstenite;

use crate::graphql::GraphQLError;
use crate::subscription::Payload;

/// Errors produced by the HTTP path and the subscription engine.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NetworkError {
    /// HTTP request failed.
    #[error("HTTP request error: {0}")]
    Request(String),
    /// Invalid URL provided.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    /// Dial, handshake or request timed out.
    #[error("Request timed out")]
    Timeout,
    /// Connection refused or failed.
    #[error("Connection error: {0}")]
    Connection(String),
    /// Invalid header name or value.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(String),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(String),
    /// Invalid response body.
    #[error("Invalid response body: {0}")]
    InvalidBody(String),
    /// HTTP error status with a body that was not a GraphQL response.
    #[error("HTTP {status}{}", .message.as_deref().map(|m| format!(": {m}")).unwrap_or_default())]
    HttpStatus {
        /// The HTTP status code.
        status: u16,
        /// Optional error message from the response body.
        message: Option<String>,
    },
    /// The server answered with one or more GraphQL errors; this is the first.
    #[error("graphql: {0}")]
    Graph(GraphQLError),
    /// Files were attached to a request sent without multipart encoding.
    #[error("cannot send files without multipart form encoding")]
    FilesRequireMultipart,
    /// The server rejected `connection_init` with `connection_error`.
    #[error("Handshake rejected: {payload}")]
    HandshakeRejected {
        /// The payload of the server's `connection_error` frame.
        payload: Payload,
    },
    /// Dial, read or write failure on the WebSocket.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The server broke the expected frame sequence.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),
    /// The subscription connection has been closed.
    #[error("Subscription connection is closed")]
    Closed,
}

impl From<reqwest::Error> for NetworkError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_connect() {
            Self::Connection(err.to_string())
        } else {
            Self::Request(err.to_string())
        }
    }
}

impl From<tungstenite::Error> for NetworkError {
    fn from(err: tungstenite::Error) -> Self {
        match err {
            tungstenite::Error::Url(e) => Self::InvalidUrl(e.to_string()),
            other => Self::Transport(other.to_string()),
        }
    }
}

impl From<url::ParseError> for NetworkError {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<std::io::Error> for NetworkError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<http::header::InvalidHeaderName> for NetworkError {
    fn from(err: http::header::InvalidHeaderName) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

impl From<http::header::InvalidHeaderValue> for NetworkError {
    fn from(err: http::header::InvalidHeaderValue) -> Self {
        Self::InvalidHeader(err.to_string())
    }
}

/// A specialized Result type for GraphQL operations.
pub type Result<T> = std::result::Result<T, NetworkError>;
