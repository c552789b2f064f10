//! Remote document store.
//!
//! # Architecture
//!
//! - [`DocumentStore`] is the seam the rest of the crate talks to; the remote
//!   store is the source of truth and its behavior is otherwise opaque
//! - [`FirestoreClient`] implements it over the Cloud Firestore REST API
//! - Per-user data lives at `users/{uid}` with the sub-collections
//!   `addresses`, `payments` and `orders`
//!
//! No retries and no timeouts are layered on top of the HTTP client: a failed
//! call fails the operation.

mod firestore;

pub use firestore::{FirestoreClient, TokenSource};

use std::future::Future;

use serde_json::{Map, Value};
use thiserror::Error;

use grocer_core::{DocumentId, UserId};

/// Errors that can occur when talking to the document store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The store answered with a non-success status.
    #[error("document store returned {status}: {message}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body.
        message: String,
    },

    /// The response could not be understood.
    #[error("JSON parse error: {0}")]
    Parse(#[from] serde_json::Error),

    /// The response was valid JSON in an unexpected shape.
    #[error("unexpected response: {0}")]
    Unexpected(String),

    /// An update targeted a document that does not exist.
    #[error("document not found: {0}")]
    NotFound(String),
}

/// A document: its id (last path segment) and its fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub fields: Map<String, Value>,
}

/// Sort direction of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

/// An ordered, limited collection query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    pub order_by: String,
    pub direction: Direction,
    pub limit: u32,
}

impl Query {
    /// Order by `field`, newest/largest first, returning at most `limit` documents.
    #[must_use]
    pub fn latest(field: impl Into<String>, limit: u32) -> Self {
        Self {
            order_by: field.into(),
            direction: Direction::Descending,
            limit,
        }
    }
}

/// A per-user sub-collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UserCollection {
    Addresses,
    Payments,
    Orders,
}

impl UserCollection {
    /// Collection id in the store.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Addresses => "addresses",
            Self::Payments => "payments",
            Self::Orders => "orders",
        }
    }
}

/// Top-level collection holding one profile document per user.
pub const USERS_COLLECTION: &str = "users";

/// Path of a user's profile document: `users/{uid}`.
#[must_use]
pub fn user_document(uid: &UserId) -> String {
    format!("{USERS_COLLECTION}/{uid}")
}

/// Path of a user's sub-collection: `users/{uid}/{collection}`.
#[must_use]
pub fn user_collection(uid: &UserId, collection: UserCollection) -> String {
    format!("{USERS_COLLECTION}/{uid}/{}", collection.name())
}

/// A document-oriented remote store.
///
/// Paths are slash-separated and relative to the database root. Document
/// paths have an even number of segments, collection paths an odd number.
pub trait DocumentStore: Send + Sync {
    /// Fetch a single document; `None` if it does not exist.
    fn get_document(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Option<Document>, StoreError>> + Send;

    /// Create or fully overwrite a document.
    fn set_document(
        &self,
        path: &str,
        fields: &Map<String, Value>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Overwrite the given top-level fields of an existing document.
    ///
    /// Fails with [`StoreError::NotFound`] if the document does not exist.
    fn update_document(
        &self,
        path: &str,
        fields: &Map<String, Value>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Fetch every document of a collection.
    fn list_collection(
        &self,
        path: &str,
    ) -> impl Future<Output = Result<Vec<Document>, StoreError>> + Send;

    /// Fetch documents of a collection ordered by a field, limited.
    fn query_collection(
        &self,
        path: &str,
        query: &Query,
    ) -> impl Future<Output = Result<Vec<Document>, StoreError>> + Send;
}
