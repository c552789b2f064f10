//! Integration tests for the auth-state reactor.
//!
//! The scripted identity provider drives sign-in and sign-out; the reactor
//! runs against a real user-data service over the in-memory document store.
//!
//! Most tests run on a paused clock: timers fire only once every task is
//! idle, so "no event within N ms" does not depend on machine load.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use grocer_client::cache::{CacheKey, TIMESTAMP_KEY};
use grocer_client::identity::{ActionCodeOperation, IdentityProvider};
use grocer_client::reactor::{AuthReactor, NoticeBoard, ReactorEvent, ReactorHandle};
use grocer_client::remote::{UserCollection, user_collection, user_document};
use grocer_client::services::UserDataService;
use grocer_client::cache::{LocalCache, ManualClock};
use grocer_client::storage::{MemoryStorage, Storage};
use grocer_core::{Email, UserId};
use grocer_integration_tests::{FakeIdentity, MemoryDocumentStore, SlowStorage, eventually};

const EMAIL: &str = "ada@example.com";
const PASSWORD: &str = "correct-horse";

struct Harness {
    identity: Arc<FakeIdentity>,
    service: Arc<UserDataService<MemoryDocumentStore>>,
    storage: Arc<dyn Storage>,
    notice: Arc<NoticeBoard>,
    reactor: ReactorHandle,
}

/// Start a reactor for an anonymous session with one registered account,
/// and consume the initial cache clear.
async fn harness(verified: bool) -> Harness {
    harness_with_storage(verified, Arc::new(MemoryStorage::new())).await
}

async fn harness_with_storage(verified: bool, storage: Arc<dyn Storage>) -> Harness {
    let identity = Arc::new(FakeIdentity::new());
    identity.add_account(EMAIL, PASSWORD, "u1", verified);

    let store = MemoryDocumentStore::new();
    let uid = UserId::new("u1");
    store.insert(user_document(&uid), json!({ "name": "Ada" }));
    store.insert(
        format!("{}/home", user_collection(&uid, UserCollection::Addresses)),
        json!({ "street": "1 Analytical Way" }),
    );

    let cache = LocalCache::new(storage.clone())
        .with_clock(Arc::new(ManualClock::at(1_700_000_000_000)));
    let service = Arc::new(UserDataService::new(store, cache));
    let notice = Arc::new(NoticeBoard::default());
    let mut reactor = AuthReactor::spawn(identity.subscribe(), service.clone(), notice.clone());

    assert!(matches!(next_event(&mut reactor).await, ReactorEvent::CacheCleared));

    Harness {
        identity,
        service,
        storage,
        notice,
        reactor,
    }
}

async fn next_event(reactor: &mut ReactorHandle) -> ReactorEvent {
    tokio::time::timeout(Duration::from_secs(2), reactor.next_event())
        .await
        .unwrap()
        .unwrap()
}

/// Returns true if nothing happens for 300 ms of (usually paused) time.
async fn no_event(reactor: &mut ReactorHandle) -> bool {
    tokio::time::timeout(Duration::from_millis(300), reactor.next_event())
        .await
        .is_err()
}

async fn sign_in(identity: &FakeIdentity) {
    identity
        .sign_in(&Email::parse(EMAIL).unwrap(), PASSWORD)
        .await
        .unwrap();
}

fn cache_keys_present(storage: &dyn Storage) -> usize {
    CacheKey::ALL
        .iter()
        .map(|key| key.storage_key())
        .chain(std::iter::once(TIMESTAMP_KEY))
        .filter(|key| storage.get_item(key).is_some())
        .count()
}

// =============================================================================
// Sign-in
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_sign_in_preloads_user_data() {
    let mut h = harness(true).await;

    sign_in(&h.identity).await;

    match next_event(&mut h.reactor).await {
        ReactorEvent::Preloaded { uid, report } => {
            assert_eq!(uid, UserId::new("u1"));
            assert!(report.is_complete());
        }
        other => panic!("expected preload, got {other:?}"),
    }
    assert_eq!(cache_keys_present(&*h.storage), 5);
    assert_eq!(h.notice.times_shown(), 0);

    // Reads after the preload are served from the cache.
    let reads = h.service.store().calls.reads();
    h.service.get_user_addresses(&UserId::new("u1")).await.unwrap();
    assert_eq!(h.service.store().calls.reads(), reads);
}

#[tokio::test(start_paused = true)]
async fn test_unverified_sign_in_shows_notice_once() {
    let mut h = harness(false).await;
    h.identity.add_action_code("verify-1", ActionCodeOperation::VerifyEmail);

    sign_in(&h.identity).await;

    let mut preloaded = false;
    let mut notices = 0;
    while !preloaded || notices == 0 {
        match next_event(&mut h.reactor).await {
            ReactorEvent::Preloaded { .. } => preloaded = true,
            ReactorEvent::NoticeShown => notices += 1,
            ReactorEvent::CacheCleared => panic!("unexpected cache clear"),
        }
    }
    assert!(h.notice.is_visible());

    // Verifying the same user neither preloads again nor re-shows the notice.
    let reads = h.service.store().calls.reads();
    h.identity.apply_action_code("verify-1").await.unwrap();
    assert!(no_event(&mut h.reactor).await);
    assert_eq!(h.service.store().calls.reads(), reads);
    assert_eq!(h.notice.times_shown(), 1);
}

// =============================================================================
// Sign-out
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_sign_out_clears_every_cache_key() {
    let mut h = harness(true).await;
    sign_in(&h.identity).await;
    assert!(matches!(next_event(&mut h.reactor).await, ReactorEvent::Preloaded { .. }));
    assert_eq!(cache_keys_present(&*h.storage), 5);

    h.identity.sign_out().await.unwrap();

    assert!(matches!(next_event(&mut h.reactor).await, ReactorEvent::CacheCleared));
    assert_eq!(cache_keys_present(&*h.storage), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sign_out_during_preload_leaves_cache_empty() {
    let mut h = harness(true).await;
    h.service.store().set_latency(Duration::from_millis(200));

    sign_in(&h.identity).await;
    let service = h.service.clone();
    assert!(eventually(|| service.store().calls.reads() > 0).await);
    h.identity.sign_out().await.unwrap();

    assert!(matches!(next_event(&mut h.reactor).await, ReactorEvent::CacheCleared));
    // Time moves past the store latency; the aborted preload never lands.
    assert!(no_event(&mut h.reactor).await);
    assert_eq!(cache_keys_present(&*h.storage), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sign_out_during_cache_write_back_leaves_cache_empty() {
    let write_delay = Duration::from_millis(50);
    let storage = Arc::new(SlowStorage::new(write_delay));
    let mut h = harness_with_storage(true, storage.clone()).await;

    // Sign out once the preload is writing its results, past its last await.
    sign_in(&h.identity).await;
    assert!(eventually(|| storage.get_item(CacheKey::UserData.storage_key()).is_some()).await);
    h.identity.sign_out().await.unwrap();

    while !matches!(next_event(&mut h.reactor).await, ReactorEvent::CacheCleared) {}
    let writes = storage.writes();

    // Long enough for the remaining entries of an unguarded write-back.
    tokio::time::sleep(write_delay * 10).await;
    assert_eq!(storage.writes(), writes);
    assert_eq!(cache_keys_present(&*storage), 0);
}

// =============================================================================
// Cancellation
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_cancelled_reactor_ignores_sign_in() {
    let h = harness(true).await;

    h.reactor.cancel();
    assert!(eventually(|| h.reactor.is_finished()).await);

    sign_in(&h.identity).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(h.service.store().calls.reads(), 0);
    assert_eq!(cache_keys_present(&*h.storage), 0);
}

#[tokio::test(start_paused = true)]
async fn test_reactor_stops_when_provider_is_dropped() {
    let h = harness(true).await;
    let Harness {
        identity, reactor, ..
    } = h;

    drop(identity);

    assert!(eventually(|| reactor.is_finished()).await);
}
