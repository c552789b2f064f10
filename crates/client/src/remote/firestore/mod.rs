//! Cloud Firestore REST client.
//!
//! Talks to `https://firestore.googleapis.com/v1/projects/{project}/databases/(default)/documents`.
//! Requests carry the project's web API key and, when a [`TokenSource`] is
//! attached and a user is signed in, the user's ID token as a bearer token so
//! that security rules see the signed-in user.

mod value;

use std::sync::Arc;

use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};
use tracing::{debug, instrument};
use url::Url;

use crate::config::FirebaseConfig;
use crate::remote::{Direction, Document, DocumentStore, Query, StoreError};

use value::{decode_document, encode_fields, field_path};

const FIRESTORE_HOST: &str = "https://firestore.googleapis.com";

/// Documents fetched per page when listing a collection.
const LIST_PAGE_SIZE: &str = "300";

/// Supplies the signed-in user's ID token for authenticated requests.
pub trait TokenSource: Send + Sync {
    /// The current ID token, or `None` when nobody is signed in.
    fn id_token(&self) -> Option<SecretString>;
}

/// Client for the Cloud Firestore REST API.
///
/// Cheap to clone; clones share the HTTP connection pool.
#[derive(Clone)]
pub struct FirestoreClient {
    client: reqwest::Client,
    documents_url: String,
    api_key: SecretString,
    tokens: Option<Arc<dyn TokenSource>>,
}

impl FirestoreClient {
    /// Create a client for the project's default database.
    #[must_use]
    pub fn new(config: &FirebaseConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            documents_url: format!(
                "{FIRESTORE_HOST}/v1/projects/{}/databases/(default)/documents",
                config.project_id
            ),
            api_key: config.api_key.clone(),
            tokens: None,
        }
    }

    /// Authenticate requests with ID tokens from `tokens`.
    #[must_use]
    pub fn with_token_source(mut self, tokens: Arc<dyn TokenSource>) -> Self {
        self.tokens = Some(tokens);
        self
    }

    /// Absolute URL of a document or collection path, with `suffix` appended
    /// (e.g. `:runQuery`).
    fn url(&self, path: &str, suffix: &str) -> Result<Url, StoreError> {
        let path = path.trim_matches('/');
        let raw = if path.is_empty() {
            format!("{}{suffix}", self.documents_url)
        } else {
            format!("{}/{path}{suffix}", self.documents_url)
        };
        let mut url = Url::parse(&raw)
            .map_err(|e| StoreError::Unexpected(format!("invalid document path {path:?}: {e}")))?;
        url.query_pairs_mut()
            .append_pair("key", self.api_key.expose_secret());
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let request = self.client.request(method, url);
        match self.tokens.as_ref().and_then(|tokens| tokens.id_token()) {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    /// Send a request and parse the JSON body of a successful response.
    async fn send(&self, request: RequestBuilder) -> Result<Value, StoreError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = error_message(&body);
            tracing::error!(status = %status, message = %message, "Firestore returned non-success status");
            return Err(StoreError::Status {
                status: status.as_u16(),
                message,
            });
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    async fn patch(&self, url: Url, fields: &Map<String, Value>) -> Result<(), StoreError> {
        let body = json!({ "fields": encode_fields(fields) });
        self.send(self.request(Method::PATCH, url).json(&body))
            .await
            .map(|_| ())
    }
}

impl DocumentStore for FirestoreClient {
    #[instrument(skip(self))]
    async fn get_document(&self, path: &str) -> Result<Option<Document>, StoreError> {
        let url = self.url(path, "")?;
        match self.send(self.request(Method::GET, url)).await {
            Ok(resource) => decode_document(&resource).map(Some),
            Err(StoreError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                debug!("Document does not exist");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self, fields), fields(field_count = fields.len()))]
    async fn set_document(&self, path: &str, fields: &Map<String, Value>) -> Result<(), StoreError> {
        let url = self.url(path, "")?;
        self.patch(url, fields).await
    }

    #[instrument(skip(self, fields), fields(field_count = fields.len()))]
    async fn update_document(
        &self,
        path: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        let mut url = self.url(path, "")?;
        {
            let mut query = url.query_pairs_mut();
            for name in fields.keys() {
                query.append_pair("updateMask.fieldPaths", &field_path(name));
            }
            query.append_pair("currentDocument.exists", "true");
        }

        match self.patch(url, fields).await {
            Err(StoreError::Status { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Err(StoreError::NotFound(path.to_owned()))
            }
            other => other,
        }
    }

    #[instrument(skip(self))]
    async fn list_collection(&self, path: &str) -> Result<Vec<Document>, StoreError> {
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = self.url(path, "")?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("pageSize", LIST_PAGE_SIZE);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }

            let page = self.send(self.request(Method::GET, url)).await?;
            if let Some(Value::Array(resources)) = page.get("documents") {
                for resource in resources {
                    documents.push(decode_document(resource)?);
                }
            }

            match page.get("nextPageToken").and_then(Value::as_str) {
                Some(token) if !token.is_empty() => page_token = Some(token.to_owned()),
                _ => break,
            }
        }

        debug!(count = documents.len(), "Listed collection");
        Ok(documents)
    }

    #[instrument(skip(self))]
    async fn query_collection(&self, path: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        let path = path.trim_matches('/');
        let (parent, collection_id) = path.rsplit_once('/').unwrap_or(("", path));
        let url = self.url(parent, ":runQuery")?;

        let direction = match query.direction {
            Direction::Ascending => "ASCENDING",
            Direction::Descending => "DESCENDING",
        };
        let body = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection_id }],
                "orderBy": [{ "field": { "fieldPath": field_path(&query.order_by) }, "direction": direction }],
                "limit": query.limit,
            }
        });

        let results = self.send(self.request(Method::POST, url).json(&body)).await?;
        let Value::Array(results) = results else {
            return Err(StoreError::Unexpected("runQuery did not return an array".to_string()));
        };

        // Entries without a document only report progress (readTime).
        let documents = results
            .iter()
            .filter_map(|result| result.get("document"))
            .map(decode_document)
            .collect::<Result<Vec<_>, _>>()?;

        debug!(count = documents.len(), "Query returned documents");
        Ok(documents)
    }
}

/// Pull `error.message` out of a Google API error body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(String::from))
        .unwrap_or_else(|| body.chars().take(200).collect())
}
