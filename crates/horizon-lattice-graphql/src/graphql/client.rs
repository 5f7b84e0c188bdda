//! GraphQL client implementation.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use http::header::{ACCEPT, AUTHORIZATION, CONNECTION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::StatusCode;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;

use super::request::GraphQLRequest;
use super::response::GraphQLResponse;
use crate::error::{NetworkError, Result};
use crate::subscription::{Subscription, SubscriptionClient, SubscriptionConfig};

const JSON_UTF8: &str = "application/json; charset=utf-8";
const OCTET_STREAM: &str = "application/octet-stream";

/// Computes extra headers for a request from its encoded operations JSON.
pub type HeaderBuilder = Arc<dyn Fn(&str) -> HeaderMap + Send + Sync>;

/// Builder for creating a GraphQL client.
pub struct GraphQLClientBuilder {
    http_url: String,
    websocket_url: Option<String>,
    http_client: Option<reqwest::Client>,
    default_headers: HashMap<String, String>,
    auth_token: Option<String>,
    connection_init_payload: Option<Result<Value>>,
    request_timeout: Option<Duration>,
    connection_timeout: Duration,
    close_timeout: Duration,
    subscription_buffer: usize,
    use_multipart_form: bool,
    close_connection: bool,
    header_builder: Option<HeaderBuilder>,
}

impl GraphQLClientBuilder {
    /// Create a new builder with the specified GraphQL endpoint URL.
    pub fn new(url: impl Into<String>) -> Self {
        let defaults = SubscriptionConfig::default();
        Self {
            http_url: url.into(),
            websocket_url: None,
            http_client: None,
            default_headers: HashMap::new(),
            auth_token: None,
            connection_init_payload: None,
            request_timeout: None,
            connection_timeout: defaults.connection_timeout,
            close_timeout: defaults.close_timeout,
            subscription_buffer: defaults.buffer_size,
            use_multipart_form: false,
            close_connection: false,
            header_builder: None,
        }
    }

    /// Set a separate WebSocket URL for subscriptions.
    ///
    /// If not set, the HTTP URL will be converted to WebSocket protocol
    /// (http:// -> ws://, https:// -> wss://).
    pub fn websocket_url(mut self, url: impl Into<String>) -> Self {
        self.websocket_url = Some(url.into());
        self
    }

    /// Use an existing `reqwest` client. `request_timeout` is ignored.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Add a default header to all requests and to the WebSocket upgrade.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.insert(name.into(), value.into());
        self
    }

    /// Add multiple headers.
    pub fn headers(mut self, headers: impl IntoIterator<Item = (String, String)>) -> Self {
        self.default_headers.extend(headers);
        self
    }

    /// Set bearer token authentication.
    ///
    /// This adds the Authorization header and, unless an explicit payload
    /// is set, sends the token in `connection_init` as well.
    pub fn bearer_auth(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.default_headers
            .insert(AUTHORIZATION.as_str().into(), format!("Bearer {token}"));
        self.auth_token = Some(token);
        self
    }

    /// Set the `connection_init` payload for subscriptions.
    ///
    /// A payload that cannot be serialized makes [`build`](Self::build) fail.
    pub fn connection_init_payload(mut self, payload: impl Serialize) -> Self {
        self.connection_init_payload = Some(serde_json::to_value(payload).map_err(NetworkError::from));
        self
    }

    /// Set the request timeout for HTTP operations.
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    /// Set the dial and handshake timeout for subscriptions.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Set how long closing the subscription connection waits for the reader.
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    /// Set the per-subscription message buffer.
    pub fn subscription_buffer(mut self, size: usize) -> Self {
        self.subscription_buffer = size;
        self
    }

    /// Send requests as `multipart/form-data` (GraphQL multipart request
    /// format). Required for requests with files.
    pub fn use_multipart_form(mut self) -> Self {
        self.use_multipart_form = true;
        self
    }

    /// Send `Connection: close` so each request uses a fresh connection.
    pub fn close_connection(mut self) -> Self {
        self.close_connection = true;
        self
    }

    /// Compute extra headers per request from the encoded operations JSON,
    /// e.g. to sign the body.
    pub fn header_builder<F>(mut self, build: F) -> Self
    where
        F: Fn(&str) -> HeaderMap + Send + Sync + 'static,
    {
        self.header_builder = Some(Arc::new(build));
        self
    }

    /// Build the GraphQL client.
    pub fn build(self) -> Result<GraphQLClient> {
        url::Url::parse(&self.http_url)?;

        let http = match self.http_client {
            Some(client) => client,
            None => {
                let mut builder = reqwest::Client::builder();
                if let Some(timeout) = self.request_timeout {
                    builder = builder.timeout(timeout);
                }
                builder.build()?
            }
        };

        let mut header_map = HeaderMap::with_capacity(self.default_headers.len());
        for (name, value) in &self.default_headers {
            header_map.insert(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }

        let websocket_url = match self.websocket_url {
            Some(url) => url,
            None => SubscriptionConfig::new(&self.http_url)
                .websocket_url()?
                .to_string(),
        };

        let init_payload = match self.connection_init_payload {
            Some(payload) => Some(payload?),
            None => self
                .auth_token
                .as_ref()
                .map(|token| serde_json::json!({ "Authorization": format!("Bearer {token}") })),
        };

        Ok(GraphQLClient {
            inner: Arc::new(GraphQLClientInner {
                http,
                http_url: self.http_url,
                websocket_url,
                default_headers: self.default_headers,
                header_map,
                init_payload,
                connection_timeout: self.connection_timeout,
                close_timeout: self.close_timeout,
                subscription_buffer: self.subscription_buffer,
                use_multipart_form: self.use_multipart_form,
                close_connection: self.close_connection,
                header_builder: self.header_builder,
                subscriptions: Mutex::new(None),
            }),
        })
    }
}

struct GraphQLClientInner {
    http: reqwest::Client,
    http_url: String,
    websocket_url: String,
    default_headers: HashMap<String, String>,
    header_map: HeaderMap,
    init_payload: Option<Value>,
    connection_timeout: Duration,
    close_timeout: Duration,
    subscription_buffer: usize,
    use_multipart_form: bool,
    close_connection: bool,
    header_builder: Option<HeaderBuilder>,
    subscriptions: Mutex<Option<SubscriptionClient>>,
}

/// A GraphQL client for queries, mutations, and subscriptions.
///
/// Queries and mutations are plain HTTP POSTs with no state kept between
/// calls. Subscriptions share one WebSocket connection that is opened on
/// the first [`subscribe`](Self::subscribe).
///
/// # Example
///
/// ```ignore
/// use horizon_lattice_graphql::{GraphQLClient, GraphQLRequest};
///
/// let client = GraphQLClient::new("https://api.example.com/graphql")
///     .bearer_auth("my-token")
///     .build()?;
///
/// // Execute a query
/// let request = GraphQLRequest::query("{ users { id name } }");
/// let response = client.execute(request).await?;
///
/// // Subscribe to events
/// let subscription = GraphQLRequest::subscription("subscription { events { id } }");
/// let mut stream = client.subscribe(subscription).await?;
/// ```
#[derive(Clone)]
pub struct GraphQLClient {
    inner: Arc<GraphQLClientInner>,
}

impl GraphQLClient {
    /// Create a new GraphQL client with the specified endpoint URL.
    pub fn new(url: impl Into<String>) -> GraphQLClientBuilder {
        GraphQLClientBuilder::new(url)
    }

    /// Create a new builder for configuring a GraphQL client.
    pub fn builder(url: impl Into<String>) -> GraphQLClientBuilder {
        GraphQLClientBuilder::new(url)
    }

    /// Get the HTTP endpoint URL.
    pub fn url(&self) -> &str {
        &self.inner.http_url
    }

    /// Get the WebSocket URL for subscriptions.
    pub fn websocket_url(&self) -> &str {
        &self.inner.websocket_url
    }

    /// Execute a query or mutation over HTTP.
    ///
    /// Returns the response when it carries no errors, otherwise
    /// [`NetworkError::Graph`] with the first error. A body that is not a
    /// GraphQL response fails with [`NetworkError::HttpStatus`] when the
    /// status is not 200 and [`NetworkError::Json`] when it is.
    pub async fn execute(&self, request: GraphQLRequest) -> Result<GraphQLResponse> {
        if request.is_subscription() {
            return Err(NetworkError::Request(
                "Use subscribe() for subscription operations".into(),
            ));
        }
        if !request.files().is_empty() && !self.inner.use_multipart_form {
            return Err(NetworkError::FilesRequireMultipart);
        }

        let operations = serde_json::to_string(&request)?;
        tracing::debug!(
            target: "horizon_lattice_graphql::graphql",
            query = %request.query,
            variables = ?request.variables,
            files = request.files().len(),
            "Executing GraphQL operation"
        );

        let mut builder = self
            .inner
            .http
            .post(&self.inner.http_url)
            .headers(self.inner.header_map.clone())
            .header(ACCEPT, JSON_UTF8);
        if self.inner.close_connection {
            builder = builder.header(CONNECTION, "close");
        }
        for (name, value) in &request.headers {
            builder = builder.header(
                HeaderName::from_bytes(name.as_bytes())?,
                HeaderValue::from_str(value)?,
            );
        }
        if let Some(build) = &self.inner.header_builder {
            for (name, value) in build(&operations).iter() {
                builder = builder.header(name, value);
            }
        }
        builder = if self.inner.use_multipart_form {
            builder.multipart(multipart_form(&request, operations)?)
        } else {
            builder.header(CONTENT_TYPE, JSON_UTF8).body(operations)
        };

        let response = builder.send().await?;
        let status = response.status();
        let body = response.bytes().await?;
        tracing::trace!(
            target: "horizon_lattice_graphql::graphql",
            %status,
            body = %String::from_utf8_lossy(&body),
            "GraphQL response"
        );

        let decoded: GraphQLResponse = match serde_json::from_slice(&body) {
            Ok(decoded) => decoded,
            Err(_) if status != StatusCode::OK => {
                let text = String::from_utf8_lossy(&body).trim().to_string();
                return Err(NetworkError::HttpStatus {
                    status: status.as_u16(),
                    message: (!text.is_empty()).then_some(text),
                });
            }
            Err(e) => {
                return Err(NetworkError::Json(format!("decoding response: {e}")));
            }
        };
        decoded.into_result()
    }

    /// Execute a request and decode its `data` into `T`.
    pub async fn run<T: DeserializeOwned>(&self, request: GraphQLRequest) -> Result<T> {
        self.execute(request).await?.data()
    }

    /// Execute a query and parse the result.
    pub async fn query<T: DeserializeOwned>(&self, query: impl Into<String>) -> Result<T> {
        self.run(GraphQLRequest::query(query)).await
    }

    /// Execute a query with variables and parse the result.
    pub async fn query_with_variables<T: DeserializeOwned>(
        &self,
        query: impl Into<String>,
        variables: impl Serialize,
    ) -> Result<T> {
        self.run(GraphQLRequest::query(query).variables(variables)).await
    }

    /// Execute a mutation and parse the result.
    pub async fn mutate<T: DeserializeOwned>(&self, mutation: impl Into<String>) -> Result<T> {
        self.run(GraphQLRequest::mutation(mutation)).await
    }

    /// Execute a mutation with variables and parse the result.
    pub async fn mutate_with_variables<T: DeserializeOwned>(
        &self,
        mutation: impl Into<String>,
        variables: impl Serialize,
    ) -> Result<T> {
        self.run(GraphQLRequest::mutation(mutation).variables(variables))
            .await
    }

    /// Settings for a subscription connection derived from this client.
    pub fn subscription_config(&self) -> SubscriptionConfig {
        let mut config = SubscriptionConfig::new(&self.inner.websocket_url)
            .headers(self.inner.default_headers.clone())
            .connection_timeout(self.inner.connection_timeout)
            .close_timeout(self.inner.close_timeout)
            .buffer_size(self.inner.subscription_buffer);
        if let Some(payload) = &self.inner.init_payload {
            config = config.init_payload(payload.clone());
        }
        config
    }

    /// Open a new, independent subscription connection.
    pub async fn subscription_client(&self) -> Result<SubscriptionClient> {
        SubscriptionClient::connect(self.subscription_config()).await
    }

    /// Subscribe on the client's shared connection.
    ///
    /// The connection is opened on first use and reopened if it has
    /// closed since.
    pub async fn subscribe(&self, request: GraphQLRequest) -> Result<Subscription> {
        if !request.is_subscription() {
            return Err(NetworkError::Request(
                "Expected a subscription operation".into(),
            ));
        }

        let connection = {
            let mut shared = self.inner.subscriptions.lock().await;
            match shared.as_ref() {
                Some(connection) if connection.is_running() => connection.clone(),
                _ => {
                    let connection = self.subscription_client().await?;
                    *shared = Some(connection.clone());
                    connection
                }
            }
        };
        connection.subscribe(request).await
    }

    /// Close the shared subscription connection, if one is open.
    pub async fn close_subscriptions(&self) -> Result<()> {
        let connection = self.inner.subscriptions.lock().await.take();
        match connection {
            Some(connection) => connection.close().await,
            None => Ok(()),
        }
    }
}

/// `operations`, then `map` (part name to variable path), then one part per file.
fn multipart_form(request: &GraphQLRequest, operations: String) -> Result<Form> {
    let mut form = Form::new().text("operations", operations);
    let files = request.files();
    if files.is_empty() {
        return Ok(form);
    }

    let map: BTreeMap<&str, [&str; 1]> = files
        .iter()
        .map(|file| (file.part_name.as_str(), [file.field.as_str()]))
        .collect();
    form = form.text("map", serde_json::to_string(&map)?);

    for file in files {
        let part = Part::bytes(file.bytes.clone())
            .file_name(file.file_name.clone())
            .mime_str(file.content_type.as_deref().unwrap_or(OCTET_STREAM))?;
        form = form.part(file.part_name.clone(), part);
    }
    Ok(form)
}

impl std::fmt::Debug for GraphQLClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphQLClient")
            .field("http_url", &self.inner.http_url)
            .field("websocket_url", &self.inner.websocket_url)
            .field("multipart", &self.inner.use_multipart_form)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let client = GraphQLClient::new("https://api.example.com/graphql")
            .build()
            .unwrap();

        assert_eq!(client.url(), "https://api.example.com/graphql");
        assert_eq!(client.websocket_url(), "wss://api.example.com/graphql");

        let config = client.subscription_config();
        assert_eq!(config.connection_timeout, Duration::from_secs(30));
        assert_eq!(config.close_timeout, Duration::from_secs(5));
        assert_eq!(config.buffer_size, 32);
        assert!(config.init_payload.is_none());
    }

    #[test]
    fn test_builder_custom_ws_url() {
        let client = GraphQLClient::new("https://api.example.com/graphql")
            .websocket_url("wss://ws.example.com/graphql")
            .build()
            .unwrap();

        assert_eq!(client.websocket_url(), "wss://ws.example.com/graphql");
    }

    #[test]
    fn test_builder_auth() {
        let client = GraphQLClient::new("http://localhost:4000/graphql")
            .bearer_auth("my-token")
            .subscription_buffer(4)
            .build()
            .unwrap();

        assert_eq!(
            client.inner.header_map.get(AUTHORIZATION).unwrap(),
            "Bearer my-token"
        );
        let config = client.subscription_config();
        assert_eq!(config.url, "ws://localhost:4000/graphql");
        assert_eq!(config.buffer_size, 4);
        assert_eq!(
            config.init_payload,
            Some(serde_json::json!({"Authorization": "Bearer my-token"}))
        );
        assert_eq!(
            config.headers.get("authorization").map(String::as_str),
            Some("Bearer my-token")
        );
    }

    #[test]
    fn test_explicit_init_payload_wins() {
        let client = GraphQLClient::new("http://localhost/graphql")
            .bearer_auth("t")
            .connection_init_payload(serde_json::json!({"token": "t"}))
            .build()
            .unwrap();
        assert_eq!(
            client.subscription_config().init_payload,
            Some(serde_json::json!({"token": "t"}))
        );
    }

    #[test]
    fn test_unserializable_init_payload_fails_build() {
        let mut payload = std::collections::BTreeMap::new();
        payload.insert((1, 2), "tuple keys are not JSON object keys");

        let result = GraphQLClient::new("http://localhost/graphql")
            .bearer_auth("t")
            .connection_init_payload(payload)
            .build();
        assert!(matches!(result, Err(NetworkError::Json(_))));
    }

    #[test]
    fn test_builder_rejects_bad_input() {
        assert!(matches!(
            GraphQLClient::new("not a url").build(),
            Err(NetworkError::InvalidUrl(_))
        ));
        assert!(matches!(
            GraphQLClient::new("http://localhost/graphql")
                .header("bad header", "x")
                .build(),
            Err(NetworkError::InvalidHeader(_))
        ));
    }

    #[tokio::test]
    async fn test_local_rejections() {
        let client = GraphQLClient::new("http://localhost/graphql").build().unwrap();

        let with_file = GraphQLRequest::mutation("mutation($f: Upload!) { up(f: $f) }")
            .file("variables.f", "a.txt", b"a".to_vec(), None);
        assert!(matches!(
            client.execute(with_file).await,
            Err(NetworkError::FilesRequireMultipart)
        ));

        let subscription = GraphQLRequest::subscription("subscription { a }");
        assert!(matches!(
            client.execute(subscription).await,
            Err(NetworkError::Request(_))
        ));

        let query = GraphQLRequest::query("{ a }");
        assert!(matches!(client.subscribe(query).await, Err(NetworkError::Request(_))));
        assert!(client.close_subscriptions().await.is_ok());
    }
}
