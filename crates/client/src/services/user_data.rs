//! Preload and read-through access to the signed-in user's data.
//!
//! Four datasets are mirrored in the [`LocalCache`]: the profile document,
//! the `addresses` and `payments` sub-collections, and the ten most recent
//! `orders`. [`UserDataService::preload`] fetches all four at once after a
//! sign-in; the `get_*` accessors serve from the cache while it is valid and
//! belongs to the requesting user, and otherwise fetch, write through, and
//! return.
//!
//! Read-through errors propagate to the caller. Preload errors do not: each
//! dataset succeeds or fails on its own and failures are only reported.
//!
//! Fetched data is written back only if the cache has not been cleared while
//! the fetch was in flight, so a sign-out is never undone by a late response.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, error, info, instrument};

use grocer_core::{AddressRecord, CachedCollection, OrderRecord, PaymentRecord, UserId, UserRecord};

use crate::cache::{CacheKey, LocalCache};
use crate::remote::{
    DocumentStore, Query, StoreError, UserCollection, user_collection, user_document,
};

/// Number of recent orders kept.
pub const RECENT_ORDERS_LIMIT: u32 = 10;

/// Outcome of a preload, per dataset.
#[derive(Debug, Default)]
pub struct PreloadReport {
    /// Datasets fetched and cached.
    pub loaded: Vec<CacheKey>,
    /// Datasets that do not exist remotely (only the profile can be missing).
    pub missing: Vec<CacheKey>,
    /// Datasets whose fetch failed.
    pub failed: Vec<(CacheKey, StoreError)>,
    /// Datasets fetched but not cached because the cache was cleared first.
    pub discarded: Vec<CacheKey>,
}

impl PreloadReport {
    fn record_write(&mut self, key: CacheKey, written: bool) {
        if written {
            self.loaded.push(key);
        } else {
            self.discarded.push(key);
        }
    }

    /// Returns true if no fetch failed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Returns true if the cache was cleared while the preload ran.
    #[must_use]
    pub fn is_superseded(&self) -> bool {
        !self.discarded.is_empty()
    }
}

/// Cached access to per-user data in a [`DocumentStore`].
#[derive(Debug)]
pub struct UserDataService<D> {
    store: D,
    cache: LocalCache,
}

impl<D: DocumentStore> UserDataService<D> {
    /// Create a service reading from `store` and caching in `cache`.
    #[must_use]
    pub const fn new(store: D, cache: LocalCache) -> Self {
        Self { store, cache }
    }

    /// The cache.
    #[must_use]
    pub const fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// The remote store.
    #[must_use]
    pub const fn store(&self) -> &D {
        &self.store
    }

    // =========================================================================
    // Preload
    // =========================================================================

    /// Fetch and cache all four datasets for `uid`.
    ///
    /// The fetches run concurrently and independently. An empty `uid` does
    /// nothing. Results arriving after a [`Self::clear_cache`] are discarded.
    #[instrument(skip(self), fields(uid = %uid))]
    pub async fn preload(&self, uid: &UserId) -> PreloadReport {
        let mut report = PreloadReport::default();
        if uid.is_empty() {
            debug!("No user id, skipping preload");
            return report;
        }
        let generation = self.cache.generation();

        let (user, addresses, payments, orders) = tokio::join!(
            self.fetch_user(uid),
            self.fetch_addresses(uid),
            self.fetch_payments(uid),
            self.fetch_orders(uid),
        );

        match user {
            Ok(Some(record)) => {
                report.record_write(
                    CacheKey::UserData,
                    self.cache.set_if_current(generation, CacheKey::UserData, &record),
                );
            }
            Ok(None) => report.missing.push(CacheKey::UserData),
            Err(e) => report.failed.push((CacheKey::UserData, e)),
        }
        self.record_collection(generation, uid, CacheKey::Addresses, addresses, &mut report);
        self.record_collection(generation, uid, CacheKey::Payments, payments, &mut report);
        self.record_collection(generation, uid, CacheKey::Orders, orders, &mut report);

        for (key, e) in &report.failed {
            error!(key = %key, error = %e, "Error preloading user data");
        }
        info!(
            loaded = report.loaded.len(),
            missing = report.missing.len(),
            failed = report.failed.len(),
            discarded = report.discarded.len(),
            "User data preloaded"
        );
        report
    }

    fn record_collection<T: Serialize>(
        &self,
        generation: u64,
        uid: &UserId,
        key: CacheKey,
        fetched: Result<Vec<T>, StoreError>,
        report: &mut PreloadReport,
    ) {
        match fetched {
            Ok(items) => {
                let cached = CachedCollection::new(uid.clone(), items);
                report.record_write(key, self.cache.set_if_current(generation, key, &cached));
            }
            Err(e) => report.failed.push((key, e)),
        }
    }

    // =========================================================================
    // Read-through accessors
    // =========================================================================

    /// The user's profile, `None` if no profile document exists.
    ///
    /// # Errors
    ///
    /// Returns the store error if the cache cannot serve the request and the
    /// remote fetch fails.
    #[instrument(skip(self), fields(uid = %uid))]
    pub async fn get_user_data(&self, uid: &UserId) -> Result<Option<UserRecord>, StoreError> {
        if self.cache.is_valid()
            && let Some(cached) = self.cache.get::<UserRecord>(CacheKey::UserData)
            && &cached.uid == uid
        {
            debug!("Cache hit for user data");
            return Ok(Some(cached));
        }

        let generation = self.cache.generation();
        let record = self.fetch_user(uid).await.inspect_err(|e| {
            error!(error = %e, "Error fetching user data");
        })?;
        if let Some(record) = &record {
            self.cache.set_if_current(generation, CacheKey::UserData, record);
        }
        Ok(record)
    }

    /// The user's saved addresses.
    ///
    /// # Errors
    ///
    /// Returns the store error if the cache cannot serve the request and the
    /// remote fetch fails.
    #[instrument(skip(self), fields(uid = %uid))]
    pub async fn get_user_addresses(&self, uid: &UserId) -> Result<Vec<AddressRecord>, StoreError> {
        self.read_through(uid, CacheKey::Addresses, self.fetch_addresses(uid))
            .await
    }

    /// The user's saved payment methods.
    ///
    /// # Errors
    ///
    /// Returns the store error if the cache cannot serve the request and the
    /// remote fetch fails.
    #[instrument(skip(self), fields(uid = %uid))]
    pub async fn get_user_payments(&self, uid: &UserId) -> Result<Vec<PaymentRecord>, StoreError> {
        self.read_through(uid, CacheKey::Payments, self.fetch_payments(uid))
            .await
    }

    /// The user's most recent orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns the store error if the cache cannot serve the request and the
    /// remote fetch fails.
    #[instrument(skip(self), fields(uid = %uid))]
    pub async fn get_user_orders(&self, uid: &UserId) -> Result<Vec<OrderRecord>, StoreError> {
        self.read_through(uid, CacheKey::Orders, self.fetch_orders(uid))
            .await
    }

    async fn read_through<T>(
        &self,
        uid: &UserId,
        key: CacheKey,
        fetch: impl Future<Output = Result<Vec<T>, StoreError>>,
    ) -> Result<Vec<T>, StoreError>
    where
        T: Serialize + DeserializeOwned,
    {
        if self.cache.is_valid()
            && let Some(cached) = self.cache.get::<CachedCollection<T>>(key)
        {
            if cached.belongs_to(uid) {
                debug!(key = %key, "Cache hit");
                return Ok(cached.items);
            }
            debug!(key = %key, cached_for = %cached.uid, "Cached entry belongs to another user");
        }

        let generation = self.cache.generation();
        let items = fetch.await.inspect_err(|e| {
            error!(key = %key, error = %e, "Error fetching user collection");
        })?;
        let cached = CachedCollection::new(uid.clone(), items);
        self.cache.set_if_current(generation, key, &cached);
        Ok(cached.items)
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Replace the user's profile document.
    ///
    /// The cache is updated before the remote write is issued.
    ///
    /// # Errors
    ///
    /// Returns the store error if the remote write fails.
    #[instrument(skip(self, fields), fields(uid = %uid))]
    pub async fn save_user_data(
        &self,
        uid: &UserId,
        fields: Map<String, Value>,
    ) -> Result<(), StoreError> {
        let record = UserRecord::from_fields(uid.clone(), fields);
        self.cache.set(CacheKey::UserData, &record);

        self.store
            .set_document(&user_document(uid), &record.profile)
            .await
            .inspect_err(|e| error!(error = %e, "Error saving user data"))
    }

    /// Update fields of the user's profile document.
    ///
    /// A cached profile of the same user is merged with `updates` before the
    /// remote write is issued.
    ///
    /// # Errors
    ///
    /// Returns the store error if the remote write fails (including when the
    /// profile document does not exist).
    #[instrument(skip(self, updates), fields(uid = %uid))]
    pub async fn update_user_data(
        &self,
        uid: &UserId,
        updates: Map<String, Value>,
    ) -> Result<(), StoreError> {
        if let Some(mut cached) = self.cache.get::<UserRecord>(CacheKey::UserData)
            && &cached.uid == uid
        {
            cached.merge(&updates);
            self.cache.set(CacheKey::UserData, &cached);
        }

        self.store
            .update_document(&user_document(uid), &updates)
            .await
            .inspect_err(|e| error!(error = %e, "Error updating user data"))
    }

    /// Drop every cached dataset.
    ///
    /// Fetches already in flight will not write their results back.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    // =========================================================================
    // Remote fetches
    // =========================================================================

    async fn fetch_user(&self, uid: &UserId) -> Result<Option<UserRecord>, StoreError> {
        let document = self.store.get_document(&user_document(uid)).await?;
        Ok(document.map(|doc| UserRecord::from_fields(uid.clone(), doc.fields)))
    }

    async fn fetch_addresses(&self, uid: &UserId) -> Result<Vec<AddressRecord>, StoreError> {
        let documents = self
            .store
            .list_collection(&user_collection(uid, UserCollection::Addresses))
            .await?;
        Ok(documents
            .into_iter()
            .map(|doc| AddressRecord::new(doc.id, doc.fields))
            .collect())
    }

    async fn fetch_payments(&self, uid: &UserId) -> Result<Vec<PaymentRecord>, StoreError> {
        let documents = self
            .store
            .list_collection(&user_collection(uid, UserCollection::Payments))
            .await?;
        Ok(documents
            .into_iter()
            .map(|doc| PaymentRecord::new(doc.id, doc.fields))
            .collect())
    }

    async fn fetch_orders(&self, uid: &UserId) -> Result<Vec<OrderRecord>, StoreError> {
        let query = Query::latest(OrderRecord::CREATED_AT_FIELD, RECENT_ORDERS_LIMIT);
        let documents = self
            .store
            .query_collection(&user_collection(uid, UserCollection::Orders), &query)
            .await?;
        Ok(documents
            .into_iter()
            .map(|doc| OrderRecord::new(doc.id, doc.fields))
            .collect())
    }
}
