//! Core types for grocer.
//!
//! This module provides type-safe wrappers for common domain concepts.

pub mod cart;
pub mod email;
pub mod id;
pub mod price;
pub mod record;

pub use cart::{CartItem, Product};
pub use email::{Email, EmailError};
pub use id::*;
pub use price::Price;
pub use record::{AddressRecord, CachedCollection, OrderRecord, PaymentRecord, UserRecord};
