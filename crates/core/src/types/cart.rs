//! Shopping cart types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::id::ProductId;
use super::price::Price;

/// A product as offered on a product page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    /// Product id; the cart keys lines by this.
    pub id: ProductId,
    /// Unit price.
    pub price: Price,
    /// Display fields (name, image, unit, ...).
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl Product {
    /// Create a product with no display fields.
    #[must_use]
    pub fn new(id: ProductId, price: Price) -> Self {
        Self {
            id,
            price,
            details: Map::new(),
        }
    }

    /// Add a display field.
    #[must_use]
    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }
}

/// One cart line: a product plus the quantity in the cart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: ProductId,
    pub price: Price,
    pub quantity: u32,
    #[serde(flatten)]
    pub details: Map<String, Value>,
}

impl CartItem {
    /// Start a line for `product` with quantity 1.
    #[must_use]
    pub fn from_product(product: Product) -> Self {
        let Product { id, price, details } = product;
        Self {
            id,
            price,
            quantity: 1,
            details,
        }
    }

    /// `price * quantity`.
    #[must_use]
    pub fn line_total(&self) -> Price {
        self.price.times(self.quantity)
    }
}
