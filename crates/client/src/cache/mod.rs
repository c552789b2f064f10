//! Local cache of the signed-in user's data.
//!
//! Four entries (profile, addresses, payment methods, recent orders) are
//! stored as JSON text in [`Storage`]. A single timestamp entry governs the
//! validity of all four: every write refreshes it, and the cache is valid
//! while the newest write is younger than the TTL (5 minutes by default).
//!
//! Read and write failures never reach the caller. They are logged and the
//! cache behaves as if the entry were missing.
//!
//! Every [`LocalCache::clear`] starts a new generation. A writer that fetched
//! its value under an older generation uses [`LocalCache::set_if_current`],
//! which drops the write instead of repopulating a cleared cache.

mod clock;

pub use clock::{Clock, ManualClock, SystemClock};

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::storage::Storage;

/// Default validity window of the cache.
pub const DEFAULT_TTL: Duration = Duration::from_secs(5 * 60);

/// Storage key of the global cache timestamp (epoch milliseconds).
pub const TIMESTAMP_KEY: &str = "cache_timestamp";

/// A cached data entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKey {
    UserData,
    Addresses,
    Payments,
    Orders,
}

impl CacheKey {
    /// Every data entry, in preload order.
    pub const ALL: [Self; 4] = [Self::UserData, Self::Addresses, Self::Payments, Self::Orders];

    /// The storage key the entry is kept under.
    #[must_use]
    pub const fn storage_key(self) -> &'static str {
        match self {
            Self::UserData => "userData_cache",
            Self::Addresses => "addresses_cache",
            Self::Payments => "payments_cache",
            Self::Orders => "orders_cache",
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.storage_key())
    }
}

/// Cache of user data over a [`Storage`].
///
/// Cheap to clone; clones share the storage, clock and generation.
#[derive(Clone)]
pub struct LocalCache {
    storage: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
    /// Held for the duration of every write and clear.
    generation: Arc<Mutex<u64>>,
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("ttl", &self.ttl)
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl LocalCache {
    /// Create a cache over `storage` using the system clock and the default TTL.
    #[must_use]
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            clock: Arc::new(SystemClock),
            ttl: DEFAULT_TTL,
            generation: Arc::new(Mutex::new(0)),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the validity window.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The validity window.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Read and parse the entry under `key`.
    ///
    /// Returns `None` if the entry is missing or does not parse as `T`.
    /// Validity is not checked; see [`Self::is_valid`].
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: CacheKey) -> Option<T> {
        let raw = self.storage.get_item(key.storage_key())?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Error reading cache entry");
                None
            }
        }
    }

    /// Serialize `value` under `key` and refresh the global timestamp.
    pub fn set<T: Serialize + ?Sized>(&self, key: CacheKey, value: &T) {
        let Some(json) = serialize(key, value) else {
            return;
        };
        let _generation = self.lock_generation();
        self.write(key, &json);
    }

    /// Like [`Self::set`], but only if the cache has not been cleared since
    /// `generation` was read from [`Self::generation`].
    ///
    /// Returns false if the write was dropped.
    pub fn set_if_current<T: Serialize + ?Sized>(
        &self,
        generation: u64,
        key: CacheKey,
        value: &T,
    ) -> bool {
        let Some(json) = serialize(key, value) else {
            return false;
        };
        let current = self.lock_generation();
        if *current != generation {
            debug!(key = %key, generation, current = *current, "Cache cleared since fetch, dropping write");
            return false;
        }
        self.write(key, &json);
        true
    }

    /// Remove every data entry and the timestamp, and start a new generation.
    /// Other storage keys are kept.
    pub fn clear(&self) {
        let mut generation = self.lock_generation();
        *generation = generation.wrapping_add(1);

        let keys = CacheKey::ALL
            .iter()
            .map(|key| key.storage_key())
            .chain(std::iter::once(TIMESTAMP_KEY));

        for key in keys {
            if let Err(e) = self.storage.remove_item(key) {
                warn!(key, error = %e, "Error clearing cache entry");
            }
        }
        debug!(generation = *generation, "Cache cleared");
    }

    /// The current generation. It changes on every [`Self::clear`].
    #[must_use]
    pub fn generation(&self) -> u64 {
        *self.lock_generation()
    }

    fn lock_generation(&self) -> MutexGuard<'_, u64> {
        // The guarded counter is always consistent, even after a panic.
        self.generation.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, key: CacheKey, json: &str) {
        let now = self.clock.now_millis().to_string();
        let result = self
            .storage
            .set_item(key.storage_key(), json)
            .and_then(|()| self.storage.set_item(TIMESTAMP_KEY, &now));

        match result {
            Ok(()) => debug!(key = %key, bytes = json.len(), "Cache entry written"),
            Err(e) => warn!(key = %key, error = %e, "Error writing cache entry"),
        }
    }

    /// Epoch milliseconds of the last cache write, if any.
    #[must_use]
    pub fn timestamp(&self) -> Option<i64> {
        self.storage.get_item(TIMESTAMP_KEY)?.trim().parse().ok()
    }

    /// Time elapsed since the last cache write, if any.
    #[must_use]
    pub fn age(&self) -> Option<Duration> {
        let elapsed = self.clock.now_millis().checked_sub(self.timestamp()?)?;
        Some(Duration::from_millis(u64::try_from(elapsed).unwrap_or(0)))
    }

    /// Returns true if the last write is younger than the TTL.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        let Some(timestamp) = self.timestamp() else {
            return false;
        };
        let ttl = i64::try_from(self.ttl.as_millis()).unwrap_or(i64::MAX);
        self.clock.now_millis().saturating_sub(timestamp) < ttl
    }
}

fn serialize<T: Serialize + ?Sized>(key: CacheKey, value: &T) -> Option<String> {
    serde_json::to_string(value)
        .inspect_err(|e| warn!(key = %key, error = %e, "Error serializing cache entry"))
        .ok()
}
