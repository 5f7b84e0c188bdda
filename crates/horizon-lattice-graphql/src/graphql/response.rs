//! GraphQL response types.

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::fmt;

use crate::error::{NetworkError, Result};

/// A GraphQL error returned by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphQLError {
    /// The error message.
    pub message: String,

    /// Locations in the document where the error occurred.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<GraphQLLocation>,

    /// Path to the field that caused the error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<PathSegment>>,

    /// Additional error metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLError {
    /// Create an error carrying only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            locations: Vec::new(),
            path: None,
            extensions: None,
        }
    }
}

impl fmt::Display for GraphQLError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)?;
        let Some(path) = &self.path else {
            return Ok(());
        };
        f.write_str(" (at ")?;
        for (i, segment) in path.iter().enumerate() {
            match segment {
                PathSegment::Field(name) if i > 0 => write!(f, ".{name}")?,
                PathSegment::Field(name) => f.write_str(name)?,
                PathSegment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        f.write_str(")")
    }
}

impl std::error::Error for GraphQLError {}

/// A location in a GraphQL document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphQLLocation {
    /// Line number (1-indexed).
    pub line: u32,
    /// Column number (1-indexed).
    pub column: u32,
}

/// A segment in an error path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// A field name.
    Field(String),
    /// An array index.
    Index(usize),
}

/// A GraphQL response, either from an HTTP call or the payload of a
/// subscription `data` frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphQLResponse {
    /// The data returned by the operation.
    #[serde(default)]
    pub data: Option<Value>,

    /// Errors that occurred during execution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<GraphQLError>,

    /// Additional response metadata.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Value>,
}

impl GraphQLResponse {
    /// Check if the response contains errors.
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Check if the response was successful (has data and no errors).
    pub fn is_success(&self) -> bool {
        self.data.is_some() && self.errors.is_empty()
    }

    /// Get the first error, if any.
    pub fn first_error(&self) -> Option<&GraphQLError> {
        self.errors.first()
    }

    /// All error messages joined with `"; "`.
    pub fn error_message(&self) -> Option<String> {
        if self.errors.is_empty() {
            return None;
        }
        let messages: Vec<&str> = self.errors.iter().map(|e| e.message.as_str()).collect();
        Some(messages.join("; "))
    }

    /// Decode `data` into `T`.
    ///
    /// Fails with [`NetworkError::Graph`] holding the first error when the
    /// response carries any errors, even alongside partial data. Absent or
    /// `null` data decodes as JSON `null`, so `Option<T>` and `()` accept it.
    pub fn data<T: DeserializeOwned>(&self) -> Result<T> {
        self.check()?;
        let data = self.data.as_ref().unwrap_or(&Value::Null);
        T::deserialize(data)
            .map_err(|e| NetworkError::Json(format!("Failed to deserialize GraphQL response: {e}")))
    }

    /// Decode a single top-level field of `data`.
    ///
    /// ```ignore
    /// // { "data": { "user": { "id": "1", "name": "John" } } }
    /// let user: User = response.field("user")?;
    /// ```
    pub fn field<T: DeserializeOwned>(&self, field: &str) -> Result<T> {
        self.check()?;
        let Some(data) = &self.data else {
            return Err(NetworkError::InvalidBody("No data in GraphQL response".into()));
        };
        let Value::Object(fields) = data else {
            return Err(NetworkError::InvalidBody("Response data is not an object".into()));
        };
        let value = fields.get(field).ok_or_else(|| {
            NetworkError::InvalidBody(format!("Field '{field}' not found in response"))
        })?;
        T::deserialize(value)
            .map_err(|e| NetworkError::Json(format!("Failed to deserialize field '{field}': {e}")))
    }

    /// Get raw data as Value without parsing.
    pub fn raw_data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// `Ok(self)` when there are no errors, otherwise the first error.
    pub fn into_result(self) -> Result<Self> {
        self.check()?;
        Ok(self)
    }

    fn check(&self) -> Result<()> {
        match self.first_error() {
            Some(error) => Err(NetworkError::Graph(error.clone())),
            None => Ok(()),
        }
    }
}
