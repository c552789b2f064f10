//! Type-safe price representation using decimal arithmetic.
//!
//! Cart totals are computed with [`rust_decimal::Decimal`] so that sums of
//! prices like `0.10 + 0.20` stay exact.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A unit or line price in the store currency.
///
/// Serialized as a decimal string; deserialization also accepts JSON numbers,
/// which is what older cart blobs contain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// A price of zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Create a price from an integer amount of cents.
    #[must_use]
    pub fn from_cents(cents: i64) -> Self {
        Self(Decimal::new(cents, 2))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${:.2}", self.0)
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl From<Decimal> for Price {
    fn from(amount: Decimal) -> Self {
        Self(amount)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_times_and_sum() {
        let total: Price = [Price::from_cents(10).times(3), Price::from_cents(20)]
            .into_iter()
            .sum();
        assert_eq!(total, Price::from_cents(50));
    }

    #[test]
    fn test_display() {
        assert_eq!(Price::from_cents(499).to_string(), "$4.99");
        assert_eq!(Price::ZERO.to_string(), "$0.00");
    }

    #[test]
    fn test_deserializes_from_json_number() {
        let price: Price = serde_json::from_str("2.5").unwrap();
        assert_eq!(price, Price::from_cents(250));
    }
}
