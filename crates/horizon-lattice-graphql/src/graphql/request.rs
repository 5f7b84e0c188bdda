//! GraphQL request types.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;

/// A GraphQL operation type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// A query operation (read-only).
    #[default]
    Query,
    /// A mutation operation (modifies data).
    Mutation,
    /// A subscription operation (real-time updates).
    Subscription,
}

/// A file attached to a request, sent as one part of a multipart upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// Path of the variable the file binds to, e.g. `variables.avatar`.
    pub field: String,
    /// Name of the multipart part ("0", "1", ... in attach order).
    pub part_name: String,
    /// File name reported to the server.
    pub file_name: String,
    /// MIME type; `application/octet-stream` when absent.
    pub content_type: Option<String>,
    /// File contents.
    pub bytes: Vec<u8>,
}

/// A GraphQL request.
///
/// Serializes to the standard `{query, variables, operationName, extensions}`
/// body. Files and per-request headers are carried alongside and used by
/// the HTTP client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphQLRequest {
    /// The GraphQL query string.
    pub query: String,

    /// Optional variables for the query.
    pub variables: Option<Value>,

    /// Optional operation name (for documents with multiple operations).
    #[serde(skip_serializing_if = "Option::is_none", rename = "operationName")]
    pub operation_name: Option<String>,

    /// Extensions (implementation-specific metadata).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,

    /// Headers added to this request only.
    #[serde(skip)]
    pub headers: Vec<(String, String)>,

    #[serde(skip)]
    pub(crate) files: Vec<UploadFile>,

    #[serde(skip)]
    pub(crate) operation_type: OperationType,
}

impl GraphQLRequest {
    fn with_type(query: String, operation_type: OperationType) -> Self {
        Self {
            query,
            variables: None,
            operation_name: None,
            extensions: None,
            headers: Vec::new(),
            files: Vec::new(),
            operation_type,
        }
    }

    /// Create a new query request.
    pub fn query(query: impl Into<String>) -> Self {
        Self::with_type(query.into(), OperationType::Query)
    }

    /// Create a new mutation request.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let request = GraphQLRequest::mutation(r#"
    ///     mutation CreateUser($name: String!) {
    ///         createUser(name: $name) {
    ///             id
    ///         }
    ///     }
    /// "#)
    /// .variable("name", "John");
    /// ```
    pub fn mutation(query: impl Into<String>) -> Self {
        Self::with_type(query.into(), OperationType::Mutation)
    }

    /// Create a new subscription request.
    pub fn subscription(query: impl Into<String>) -> Self {
        Self::with_type(query.into(), OperationType::Subscription)
    }

    /// Create a request, inferring the operation type from the document's
    /// leading keyword (anonymous `{ ... }` documents are queries).
    pub fn new(query: impl Into<String>) -> Self {
        let query = query.into();
        let operation_type = Self::infer_operation_type(&query);
        Self::with_type(query, operation_type)
    }

    /// Set a variable value.
    ///
    /// ```ignore
    /// let request = GraphQLRequest::query("...")
    ///     .variable("id", "123")
    ///     .variable("limit", 10);
    /// ```
    pub fn variable(mut self, name: impl Into<String>, value: impl Serialize) -> Self {
        let variables = self
            .variables
            .get_or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(map) = variables {
            match serde_json::to_value(value) {
                Ok(value) => {
                    map.insert(name.into(), value);
                }
                Err(e) => {
                    tracing::warn!(target: "horizon_lattice_graphql::graphql", "Failed to serialize variable: {}", e);
                }
            }
        }
        self
    }

    /// Replace all variables with a serializable value.
    pub fn variables(mut self, variables: impl Serialize) -> Self {
        self.variables = serde_json::to_value(variables).ok();
        self
    }

    /// Set variables from a HashMap.
    pub fn variables_map(mut self, variables: HashMap<String, Value>) -> Self {
        self.variables = Some(Value::Object(variables.into_iter().collect()));
        self
    }

    /// Set the operation name.
    pub fn operation_name(mut self, name: impl Into<String>) -> Self {
        self.operation_name = Some(name.into());
        self
    }

    /// Set extensions (implementation-specific metadata).
    pub fn extensions(mut self, extensions: impl Serialize) -> Self {
        self.extensions = serde_json::to_value(extensions).ok();
        self
    }

    /// Add a header sent with this request only. Repeated names are all sent.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Attach a file for a multipart upload.
    ///
    /// `field` is the variable path the file fills in, e.g.
    /// `variables.file`. Only clients built with
    /// [`use_multipart_form`](crate::GraphQLClientBuilder::use_multipart_form)
    /// can send requests with files.
    pub fn file(
        mut self,
        field: impl Into<String>,
        file_name: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
        content_type: Option<&str>,
    ) -> Self {
        let part_name = self.files.len().to_string();
        self.files.push(UploadFile {
            field: field.into(),
            part_name,
            file_name: file_name.into(),
            content_type: content_type.map(str::to_string),
            bytes: bytes.into(),
        });
        self
    }

    /// Attach a file read from disk. The file name is taken from the path.
    pub fn file_path(
        self,
        field: impl Into<String>,
        path: impl AsRef<Path>,
        content_type: Option<&str>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(self.file(field, file_name, bytes, content_type))
    }

    /// Get the variables.
    pub fn vars(&self) -> Option<&Value> {
        self.variables.as_ref()
    }

    /// Get the attached files.
    pub fn files(&self) -> &[UploadFile] {
        &self.files
    }

    /// Get the operation type.
    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    /// Check if this is a subscription.
    pub fn is_subscription(&self) -> bool {
        self.operation_type == OperationType::Subscription
    }

    fn infer_operation_type(query: &str) -> OperationType {
        let keyword = query
            .trim_start()
            .split(|c: char| !(c.is_alphanumeric() || c == '_'))
            .next()
            .unwrap_or_default();
        match keyword {
            "subscription" => OperationType::Subscription,
            "mutation" => OperationType::Mutation,
            _ => OperationType::Query,
        }
    }
}
