//! Integration tests for the Grocer client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p grocer-integration-tests
//! ```
//!
//! No network access is needed: the document store and the identity provider
//! are replaced by the in-memory fakes in this crate.
//!
//! # Test Categories
//!
//! - `user_data` - preload and read-through against a counting store
//! - `reactor` - auth-state driven preload, cache clearing and notices
//! - `account` - account service and email action links

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::{Map, Value};
use url::Url;

use grocer_client::cache::{LocalCache, ManualClock};
use grocer_client::identity::{
    ActionCodeInfo, ActionCodeOperation, AuthError, AuthState, AuthStatePublisher,
    AuthSubscription, AuthUser, IdentityProvider,
};
use grocer_client::remote::{Direction, Document, DocumentStore, Query, StoreError};
use grocer_client::storage::{MemoryStorage, Storage, StorageError};
use grocer_core::{DocumentId, Email, UserId};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Document store
// =============================================================================

/// Counts of remote calls made against a [`MemoryDocumentStore`].
#[derive(Debug, Default)]
pub struct CallCounts {
    pub get: AtomicUsize,
    pub set: AtomicUsize,
    pub update: AtomicUsize,
    pub list: AtomicUsize,
    pub query: AtomicUsize,
}

impl CallCounts {
    /// All read calls.
    #[must_use]
    pub fn reads(&self) -> usize {
        self.get.load(Ordering::SeqCst)
            + self.list.load(Ordering::SeqCst)
            + self.query.load(Ordering::SeqCst)
    }

    /// All write calls.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.set.load(Ordering::SeqCst) + self.update.load(Ordering::SeqCst)
    }
}

/// In-memory [`DocumentStore`] that counts calls and can be told to fail.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: Mutex<BTreeMap<String, Map<String, Value>>>,
    failing: Mutex<HashSet<String>>,
    latency: Mutex<Option<Duration>>,
    /// Calls made so far.
    pub calls: CallCounts,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a document at `path`.
    pub fn insert(&self, path: impl Into<String>, fields: Value) {
        let fields = match fields {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        lock(&self.documents).insert(path.into(), fields);
    }

    /// The fields of the document at `path`.
    #[must_use]
    pub fn document(&self, path: &str) -> Option<Map<String, Value>> {
        lock(&self.documents).get(path).cloned()
    }

    /// Make every call touching `path` fail.
    pub fn fail_on(&self, path: impl Into<String>) {
        lock(&self.failing).insert(path.into());
    }

    /// Delay every read by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = Some(latency);
    }

    async fn enter(&self, path: &str) -> Result<(), StoreError> {
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if lock(&self.failing).contains(path) {
            return Err(StoreError::Status {
                status: 503,
                message: format!("injected failure for {path}"),
            });
        }
        Ok(())
    }

    fn children(&self, collection: &str) -> Vec<Document> {
        let prefix = format!("{collection}/");
        lock(&self.documents)
            .iter()
            .filter_map(|(path, fields)| {
                let id = path.strip_prefix(&prefix)?;
                (!id.contains('/')).then(|| Document {
                    id: DocumentId::new(id),
                    fields: fields.clone(),
                })
            })
            .collect()
    }
}

fn sort_key(document: &Document, field: &str) -> String {
    match document.fields.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

impl DocumentStore for MemoryDocumentStore {
    async fn get_document(&self, path: &str) -> Result<Option<Document>, StoreError> {
        self.calls.get.fetch_add(1, Ordering::SeqCst);
        self.enter(path).await?;
        let id = path.rsplit('/').next().unwrap_or(path);
        Ok(self.document(path).map(|fields| Document {
            id: DocumentId::new(id),
            fields,
        }))
    }

    async fn set_document(&self, path: &str, fields: &Map<String, Value>) -> Result<(), StoreError> {
        self.calls.set.fetch_add(1, Ordering::SeqCst);
        self.enter(path).await?;
        lock(&self.documents).insert(path.to_string(), fields.clone());
        Ok(())
    }

    async fn update_document(
        &self,
        path: &str,
        fields: &Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        self.enter(path).await?;
        let mut documents = lock(&self.documents);
        let existing = documents
            .get_mut(path)
            .ok_or_else(|| StoreError::NotFound(path.to_string()))?;
        for (key, value) in fields {
            existing.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    async fn list_collection(&self, path: &str) -> Result<Vec<Document>, StoreError> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);
        self.enter(path).await?;
        Ok(self.children(path))
    }

    async fn query_collection(&self, path: &str, query: &Query) -> Result<Vec<Document>, StoreError> {
        self.calls.query.fetch_add(1, Ordering::SeqCst);
        self.enter(path).await?;
        let mut documents = self.children(path);
        documents.sort_by_key(|doc| sort_key(doc, &query.order_by));
        if query.direction == Direction::Descending {
            documents.reverse();
        }
        documents.truncate(usize::try_from(query.limit).unwrap_or(usize::MAX));
        Ok(documents)
    }
}

// =============================================================================
// Identity provider
// =============================================================================

/// An email the fake provider "sent".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SentEmail {
    Verification { to: Option<String>, continue_url: Url },
    PasswordReset { to: String, continue_url: Url },
}

#[derive(Debug, Clone)]
struct Account {
    password: String,
    user: AuthUser,
}

/// Scripted in-memory [`IdentityProvider`].
#[derive(Debug, Default)]
pub struct FakeIdentity {
    state: AuthStatePublisher,
    accounts: Mutex<HashMap<String, Account>>,
    action_codes: Mutex<HashMap<String, ActionCodeOperation>>,
    applied: Mutex<Vec<String>>,
    sent: Mutex<Vec<SentEmail>>,
}

impl FakeIdentity {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account that can sign in.
    pub fn add_account(&self, email: &str, password: &str, uid: &str, email_verified: bool) {
        let user = AuthUser {
            uid: UserId::new(uid),
            email: Email::parse(email).ok(),
            email_verified,
        };
        lock(&self.accounts).insert(
            email.to_string(),
            Account {
                password: password.to_string(),
                user,
            },
        );
    }

    /// Register an action code the provider will accept.
    pub fn add_action_code(&self, code: &str, operation: ActionCodeOperation) {
        lock(&self.action_codes).insert(code.to_string(), operation);
    }

    /// Put `state` out as if the provider had changed it on its own.
    pub fn publish(&self, state: AuthState) {
        self.state.publish(state);
    }

    /// Action codes applied so far.
    #[must_use]
    pub fn applied_codes(&self) -> Vec<String> {
        lock(&self.applied).clone()
    }

    /// Emails sent so far.
    #[must_use]
    pub fn sent_emails(&self) -> Vec<SentEmail> {
        lock(&self.sent).clone()
    }

    fn signed_in(&self, user: AuthUser) -> AuthUser {
        self.state.publish(AuthState::Authenticated(user.clone()));
        user
    }
}

impl IdentityProvider for FakeIdentity {
    fn subscribe(&self) -> AuthSubscription {
        self.state.subscribe()
    }

    fn current_user(&self) -> Option<AuthUser> {
        self.state.current().user().cloned()
    }

    async fn create_account(&self, email: &Email, password: &str) -> Result<AuthUser, AuthError> {
        if password.len() < 6 {
            return Err(AuthError::WeakPassword(
                "Password should be at least 6 characters".to_string(),
            ));
        }
        let user = {
            let mut accounts = lock(&self.accounts);
            if accounts.contains_key(email.as_str()) {
                return Err(AuthError::EmailExists);
            }
            let user = AuthUser {
                uid: UserId::new(format!("uid-{}", accounts.len() + 1)),
                email: Some(email.clone()),
                email_verified: false,
            };
            accounts.insert(
                email.as_str().to_string(),
                Account {
                    password: password.to_string(),
                    user: user.clone(),
                },
            );
            user
        };
        Ok(self.signed_in(user))
    }

    async fn sign_in(&self, email: &Email, password: &str) -> Result<AuthUser, AuthError> {
        let account = lock(&self.accounts).get(email.as_str()).cloned();
        match account {
            Some(account) if account.password == password => Ok(self.signed_in(account.user)),
            _ => Err(AuthError::InvalidCredentials),
        }
    }

    async fn sign_out(&self) -> Result<(), AuthError> {
        self.state.publish(AuthState::Anonymous);
        Ok(())
    }

    async fn send_email_verification(&self, continue_url: &Url) -> Result<(), AuthError> {
        let user = self.current_user().ok_or(AuthError::NoCurrentUser)?;
        lock(&self.sent).push(SentEmail::Verification {
            to: user.email.map(Email::into_inner),
            continue_url: continue_url.clone(),
        });
        Ok(())
    }

    async fn send_password_reset(&self, email: &Email, continue_url: &Url) -> Result<(), AuthError> {
        lock(&self.sent).push(SentEmail::PasswordReset {
            to: email.as_str().to_string(),
            continue_url: continue_url.clone(),
        });
        Ok(())
    }

    async fn apply_action_code(&self, code: &str) -> Result<(), AuthError> {
        let operation = lock(&self.action_codes)
            .remove(code)
            .ok_or(AuthError::InvalidActionCode)?;
        lock(&self.applied).push(code.to_string());

        if operation == ActionCodeOperation::VerifyEmail
            && let Some(mut user) = self.current_user()
        {
            user.email_verified = true;
            self.state.publish(AuthState::Authenticated(user));
        }
        Ok(())
    }

    async fn check_action_code(&self, code: &str) -> Result<ActionCodeInfo, AuthError> {
        let operation = lock(&self.action_codes)
            .get(code)
            .cloned()
            .ok_or(AuthError::InvalidActionCode)?;
        Ok(ActionCodeInfo {
            operation,
            email: None,
        })
    }

    async fn update_email(&self, new_email: &Email) -> Result<(), AuthError> {
        let mut user = self.current_user().ok_or(AuthError::NoCurrentUser)?;
        user.email = Some(new_email.clone());
        user.email_verified = false;
        self.state.publish(AuthState::Authenticated(user));
        Ok(())
    }
}

// =============================================================================
// Storage
// =============================================================================

/// [`MemoryStorage`] whose writes block the calling thread, like a slow disk.
#[derive(Debug)]
pub struct SlowStorage {
    inner: MemoryStorage,
    write_delay: Duration,
    writes: AtomicUsize,
}

impl SlowStorage {
    #[must_use]
    pub fn new(write_delay: Duration) -> Self {
        Self {
            inner: MemoryStorage::new(),
            write_delay,
            writes: AtomicUsize::new(0),
        }
    }

    /// Completed `set_item` calls.
    #[must_use]
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl Storage for SlowStorage {
    fn get_item(&self, key: &str) -> Option<String> {
        self.inner.get_item(key)
    }

    fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
        std::thread::sleep(self.write_delay);
        self.inner.set_item(key, value)?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<(), StorageError> {
        self.inner.remove_item(key)
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// A cache over fresh in-memory storage with a manual clock.
#[must_use]
pub fn memory_cache() -> (LocalCache, Arc<MemoryStorage>, Arc<ManualClock>) {
    let storage = Arc::new(MemoryStorage::new());
    let clock = Arc::new(ManualClock::at(1_700_000_000_000));
    let cache = LocalCache::new(storage.clone()).with_clock(clock.clone());
    (cache, storage, clock)
}

/// Poll `condition` until it holds or two seconds pass.
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
