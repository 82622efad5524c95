//! Shopping cart value types.

use common::Money;
use serde::{Deserialize, Serialize};

/// A single priced line in a cart.
///
/// Lines are copied verbatim into an order at creation time, so the same
/// type doubles as the frozen order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    /// Catalog item identifier.
    pub item_id: String,

    /// Human-readable item name.
    pub display_name: String,

    /// Price per unit in the settlement currency.
    pub unit_price: Money,
}

impl CartLine {
    /// Creates a new cart line.
    pub fn new(
        item_id: impl Into<String>,
        display_name: impl Into<String>,
        unit_price: Money,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            display_name: display_name.into(),
            unit_price,
        }
    }
}

/// The cart owned by a single user.
///
/// Carts have replace-whole-value semantics: every edit stores a new
/// `Cart`, there are no partial updates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    /// Lines in insertion order.
    pub lines: Vec<CartLine>,
}

impl Cart {
    /// Creates a cart from a list of lines.
    pub fn new(lines: Vec<CartLine>) -> Self {
        Self { lines }
    }

    /// Returns true if the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Returns the number of lines.
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    /// Returns the sum of all line prices, or `None` if it overflows.
    pub fn total(&self) -> Option<Money> {
        Money::checked_sum(self.lines.iter().map(|line| line.unit_price))
    }
}
