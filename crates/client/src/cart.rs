//! Shopping cart persisted to storage.
//!
//! The whole cart is one JSON array under the `cart` key, rewritten on every
//! mutation. A mutation takes effect only once it has been persisted. The
//! cart is independent of who is signed in.

use std::sync::Arc;

use tracing::{debug, warn};

use grocer_core::{CartItem, Price, Product, ProductId};

use crate::storage::{Storage, StorageError};

/// Storage key of the cart.
pub const CART_KEY: &str = "cart";

/// The shopping cart.
pub struct CartManager {
    storage: Arc<dyn Storage>,
    items: Vec<CartItem>,
}

impl std::fmt::Debug for CartManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartManager")
            .field("items", &self.items)
            .finish_non_exhaustive()
    }
}

impl CartManager {
    /// Load the cart from `storage`. A missing or unreadable cart is empty.
    #[must_use]
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let items = match storage.get_item(CART_KEY) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!(error = %e, "Stored cart is unreadable, starting empty");
                Vec::new()
            }),
            None => Vec::new(),
        };
        Self { storage, items }
    }

    /// The cart's lines in insertion order.
    #[must_use]
    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    /// Returns true if the cart has no lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Add one unit of `product`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    pub fn add(&mut self, product: Product) -> Result<(), StorageError> {
        let mut items = self.items.clone();
        if let Some(item) = items.iter_mut().find(|item| item.id == product.id) {
            item.quantity = item.quantity.saturating_add(1);
        } else {
            items.push(CartItem::from_product(product));
        }
        self.commit(items)
    }

    /// Remove the line for `id`. Removing an absent product changes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    pub fn remove(&mut self, id: &ProductId) -> Result<(), StorageError> {
        if !self.contains(id) {
            debug!(product_id = %id, "Product not in cart");
            return Ok(());
        }
        let items = self
            .items
            .iter()
            .filter(|item| &item.id != id)
            .cloned()
            .collect();
        self.commit(items)
    }

    /// Set the quantity of the line for `id`; zero removes it.
    ///
    /// Returns false if the product is not in the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    pub fn set_quantity(&mut self, id: &ProductId, quantity: u32) -> Result<bool, StorageError> {
        if !self.contains(id) {
            return Ok(false);
        }
        if quantity == 0 {
            self.remove(id)?;
            return Ok(true);
        }

        let mut items = self.items.clone();
        for item in items.iter_mut().filter(|item| &item.id == id) {
            item.quantity = quantity;
        }
        self.commit(items)?;
        Ok(true)
    }

    /// Empty the cart.
    ///
    /// # Errors
    ///
    /// Returns an error if the cart could not be persisted.
    pub fn clear(&mut self) -> Result<(), StorageError> {
        self.commit(Vec::new())
    }

    /// Sum of price × quantity over all lines.
    #[must_use]
    pub fn total(&self) -> Price {
        self.items.iter().map(CartItem::line_total).sum()
    }

    /// Sum of quantities over all lines.
    #[must_use]
    pub fn item_count(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |count, item| count.saturating_add(item.quantity))
    }

    fn contains(&self, id: &ProductId) -> bool {
        self.items.iter().any(|item| &item.id == id)
    }

    /// Persist `items`, then make them the cart.
    fn commit(&mut self, items: Vec<CartItem>) -> Result<(), StorageError> {
        let json = serde_json::to_string(&items)?;
        self.storage.set_item(CART_KEY, &json)?;
        self.items = items;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;
    use crate::storage::MemoryStorage;

    /// Storage that rejects writes while `full` is set.
    #[derive(Default)]
    struct FullDisk {
        inner: MemoryStorage,
        full: AtomicBool,
    }

    impl Storage for FullDisk {
        fn get_item(&self, key: &str) -> Option<String> {
            self.inner.get_item(key)
        }

        fn set_item(&self, key: &str, value: &str) -> Result<(), StorageError> {
            if self.full.load(Ordering::SeqCst) {
                return Err(std::io::Error::other("no space left on device").into());
            }
            self.inner.set_item(key, value)
        }

        fn remove_item(&self, key: &str) -> Result<(), StorageError> {
            self.inner.remove_item(key)
        }
    }

    fn product(id: &str, cents: i64) -> Product {
        Product::new(ProductId::new(id), Price::from_cents(cents)).with_detail("name", id)
    }

    fn empty_cart() -> (Arc<MemoryStorage>, CartManager) {
        let storage = Arc::new(MemoryStorage::new());
        let cart = CartManager::load(storage.clone());
        (storage, cart)
    }

    #[test]
    fn test_add_same_product_twice_increments() {
        let (storage, mut cart) = empty_cart();
        cart.add(product("apple", 125)).unwrap();
        cart.add(product("apple", 125)).unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 2);
        assert_eq!(cart.item_count(), 2);

        let reloaded = CartManager::load(storage);
        assert_eq!(reloaded.items(), cart.items());
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let (storage, mut cart) = empty_cart();
        cart.add(product("apple", 125)).unwrap();
        let stored = storage.get_item(CART_KEY).unwrap();

        cart.remove(&ProductId::new("pear")).unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(storage.get_item(CART_KEY).unwrap(), stored);
    }

    #[test]
    fn test_remove_on_empty_cart_does_not_write() {
        let (storage, mut cart) = empty_cart();
        cart.remove(&ProductId::new("pear")).unwrap();
        assert!(storage.get_item(CART_KEY).is_none());
    }

    #[test]
    fn test_remove_and_clear_persist() {
        let (storage, mut cart) = empty_cart();
        cart.add(product("apple", 125)).unwrap();
        cart.add(product("bread", 350)).unwrap();

        cart.remove(&ProductId::new("apple")).unwrap();
        assert_eq!(CartManager::load(storage.clone()).items().len(), 1);

        cart.clear().unwrap();
        assert!(cart.is_empty());
        assert_eq!(storage.get_item(CART_KEY).unwrap(), "[]");
    }

    #[test]
    fn test_totals() {
        let (_, mut cart) = empty_cart();
        assert_eq!(cart.total(), Price::ZERO);
        assert_eq!(cart.item_count(), 0);

        cart.add(product("apple", 125)).unwrap();
        cart.add(product("apple", 125)).unwrap();
        cart.add(product("bread", 350)).unwrap();

        assert_eq!(cart.total(), Price::from_cents(600));
        assert_eq!(cart.item_count(), 3);
    }

    #[test]
    fn test_set_quantity() {
        let (_, mut cart) = empty_cart();
        cart.add(product("apple", 125)).unwrap();

        assert!(cart.set_quantity(&ProductId::new("apple"), 5).unwrap());
        assert_eq!(cart.item_count(), 5);

        assert!(!cart.set_quantity(&ProductId::new("pear"), 2).unwrap());

        assert!(cart.set_quantity(&ProductId::new("apple"), 0).unwrap());
        assert!(cart.is_empty());
    }

    #[test]
    fn test_failed_persist_leaves_cart_unchanged() {
        let storage = Arc::new(FullDisk::default());
        let mut cart = CartManager::load(storage.clone());
        cart.add(product("apple", 125)).unwrap();
        let before = cart.items().to_vec();

        storage.full.store(true, Ordering::SeqCst);
        assert!(cart.add(product("apple", 125)).is_err());
        assert!(cart.add(product("bread", 350)).is_err());
        assert!(cart.set_quantity(&ProductId::new("apple"), 9).is_err());
        assert!(cart.remove(&ProductId::new("apple")).is_err());
        assert!(cart.clear().is_err());

        assert_eq!(cart.items(), before.as_slice());
        assert_eq!(CartManager::load(storage).items(), before.as_slice());
    }

    #[test]
    fn test_load_corrupt_cart_is_empty() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(CART_KEY, "{not json").unwrap();
        assert!(CartManager::load(storage).is_empty());
    }

    #[test]
    fn test_load_reads_numeric_prices() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .set_item(
                CART_KEY,
                r#"[{"id":"apple","name":"Apple","price":1.25,"quantity":3}]"#,
            )
            .unwrap();

        let cart = CartManager::load(storage);
        assert_eq!(cart.item_count(), 3);
        assert_eq!(cart.total(), Price::from_cents(375));
        assert_eq!(cart.items()[0].details["name"], "Apple");
    }
}
