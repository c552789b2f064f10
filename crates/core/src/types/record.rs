//! Per-user records mirrored from the remote document store.
//!
//! Records are owned by the remote store; the client only mirrors them in its
//! local cache. Apart from the document id (and `uid` for the profile) every
//! field is kept as arbitrary JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::id::{DocumentId, UserId};

/// A user's profile document, tagged with the owning user id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Identity provider user id.
    pub uid: UserId,
    /// Remaining profile fields.
    #[serde(flatten)]
    pub profile: Map<String, Value>,
}

impl UserRecord {
    /// Build a record from a profile document's fields.
    ///
    /// A `uid` field inside the document is dropped; the identity id wins.
    #[must_use]
    pub fn from_fields(uid: UserId, mut profile: Map<String, Value>) -> Self {
        profile.remove("uid");
        Self { uid, profile }
    }

    /// Shallow-merge `updates` into the profile, overwriting existing keys.
    pub fn merge(&mut self, updates: &Map<String, Value>) {
        for (key, value) in updates {
            if key != "uid" {
                self.profile.insert(key.clone(), value.clone());
            }
        }
    }
}

macro_rules! define_record {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
        pub struct $name {
            /// Document id within the user's sub-collection.
            pub id: DocumentId,
            /// Document fields.
            #[serde(flatten)]
            pub fields: Map<String, Value>,
        }

        impl $name {
            /// Build a record from a document id and its fields.
            ///
            /// An `id` field inside the document is dropped; the document id wins.
            #[must_use]
            pub fn new(id: DocumentId, mut fields: Map<String, Value>) -> Self {
                fields.remove("id");
                Self { id, fields }
            }
        }
    };
}

define_record!(
    /// A saved shipping or billing address.
    AddressRecord
);
define_record!(
    /// A saved payment method.
    PaymentRecord
);
define_record!(
    /// A placed order.
    OrderRecord
);

impl OrderRecord {
    /// Field the remote store orders orders by.
    pub const CREATED_AT_FIELD: &'static str = "createdAt";

    /// The order's creation time, if present and an RFC 3339 timestamp.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.fields
            .get(Self::CREATED_AT_FIELD)
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// A cached list of records together with the user it was fetched for.
///
/// Cached lists are only served back to the same user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedCollection<T> {
    /// User the items were fetched for.
    pub uid: UserId,
    /// The records.
    pub items: Vec<T>,
}

impl<T> CachedCollection<T> {
    /// Wrap `items` fetched for `uid`.
    #[must_use]
    pub const fn new(uid: UserId, items: Vec<T>) -> Self {
        Self { uid, items }
    }

    /// Returns true if the items were fetched for `uid`.
    #[must_use]
    pub fn belongs_to(&self, uid: &UserId) -> bool {
        &self.uid == uid
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use serde_json::json;

    use super::*;

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_user_record_flattens_profile() {
        let record = UserRecord::from_fields(
            UserId::new("u1"),
            fields(json!({ "displayName": "Ada", "uid": "spoofed" })),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json, json!({ "uid": "u1", "displayName": "Ada" }));
    }

    #[test]
    fn test_user_record_merge() {
        let mut record = UserRecord::from_fields(UserId::new("u1"), fields(json!({ "a": 1, "b": 2 })));
        record.merge(&fields(json!({ "b": 3, "uid": "other" })));
        assert_eq!(record.uid, UserId::new("u1"));
        assert_eq!(record.profile.get("b"), Some(&json!(3)));
        assert_eq!(record.profile.get("a"), Some(&json!(1)));
    }

    #[test]
    fn test_order_created_at() {
        let order = OrderRecord::new(
            DocumentId::new("o1"),
            fields(json!({ "createdAt": "2026-03-01T10:00:00Z", "total": 12.5 })),
        );
        assert_eq!(
            order.created_at().unwrap().to_rfc3339(),
            "2026-03-01T10:00:00+00:00"
        );

        let undated = OrderRecord::new(DocumentId::new("o2"), fields(json!({ "createdAt": 5 })));
        assert!(undated.created_at().is_none());
    }

    #[test]
    fn test_cached_collection_owner() {
        let cached: CachedCollection<AddressRecord> = CachedCollection::new(UserId::new("u1"), vec![]);
        assert!(cached.belongs_to(&UserId::new("u1")));
        assert!(!cached.belongs_to(&UserId::new("u2")));
    }
}
