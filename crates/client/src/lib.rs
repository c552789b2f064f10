//! Grocer client library.
//!
//! The front-end utility layer of the grocery store: a local key-value cache
//! of the signed-in user's data, read-through access to the hosted document
//! store, reactions to identity-provider state changes, and the shopping cart.
//!
//! # Architecture
//!
//! - [`storage`] - key → string persistent storage (in-memory or JSON file)
//! - [`cache`] - cache of user data with a single global validity window
//! - [`remote`] - document store trait and its Firestore REST implementation
//! - [`identity`] - identity provider trait and its Firebase Auth REST implementation
//! - [`services`] - preload/read-through orchestration, account operations, email links
//! - [`reactor`] - auth-state driven side effects (preload, cache clear, notice)
//! - [`cart`] - shopping cart persisted to storage
//!
//! # Example
//!
//! ```rust,ignore
//! let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(&config.local.storage_path)?);
//! let identity = Arc::new(FirebaseAuthClient::new(&config.firebase));
//! let store = FirestoreClient::new(&config.firebase).with_token_source(identity.clone());
//! let cache = LocalCache::new(storage.clone()).with_ttl(config.local.cache_ttl);
//! let user_data = Arc::new(UserDataService::new(store, cache));
//!
//! let reactor = AuthReactor::spawn(identity.subscribe(), user_data.clone(), Arc::new(NoticeBoard::default()));
//! identity.sign_in(&email, &password).await?;
//! let orders = user_data.get_user_orders(&uid).await?;
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod cache;
pub mod cart;
pub mod config;
pub mod identity;
pub mod reactor;
pub mod remote;
pub mod services;
pub mod storage;
