//! GraphQL over HTTP: requests, responses and the client.
//!
//! Queries and mutations are sent as a JSON POST, or as a
//! `multipart/form-data` POST when the client is built with
//! [`use_multipart_form`](GraphQLClientBuilder::use_multipart_form) so that
//! files can be attached.
//!
//! # Example
//!
//! ```ignore
//! use horizon_lattice_graphql::graphql::{GraphQLClient, GraphQLRequest};
//!
//! let client = GraphQLClient::new("https://api.example.com/graphql").build()?;
//!
//! let request = GraphQLRequest::query(r#"
//!     query GetUser($id: ID!) {
//!         user(id: $id) { id name email }
//!     }
//! "#)
//! .variable("id", "123");
//!
//! let user: User = client.execute(request).await?.field("user")?;
//! ```
//!
//! # Uploads
//!
//! ```ignore
//! let client = GraphQLClient::new("https://api.example.com/graphql")
//!     .use_multipart_form()
//!     .build()?;
//!
//! let request = GraphQLRequest::mutation(r#"
//!     mutation Upload($file: Upload!) { upload(file: $file) { id } }
//! "#)
//! .file_path("variables.file", "report.pdf", Some("application/pdf"))?;
//!
//! client.execute(request).await?;
//! ```

mod client;
mod request;
mod response;

pub use client::{GraphQLClient, GraphQLClientBuilder, HeaderBuilder};
pub use request::{GraphQLRequest, OperationType, UploadFile};
pub use response::{GraphQLError, GraphQLLocation, GraphQLResponse, PathSegment};
