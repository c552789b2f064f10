//! Grocer Core - Shared types library.
//!
//! This crate provides the types shared by the grocer components:
//! - `client` - Cache, remote data client, auth reactor and cart
//! - `cli` - Command-line front end
//!
//! # Architecture
//!
//! The core crate contains only types - no I/O, no storage access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype ids, emails, prices, user records and cart items

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;
