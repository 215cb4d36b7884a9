//! Server-owned entities as seen by the client.
//!
//! Monetary amounts use [`Decimal`]; the server renders them as two-decimal
//! strings (`"750.00"`).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A catalog product.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub price: Decimal,
}

/// A line in the caller's cart.
///
/// A quantity of zero is equivalent to the line being absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: u64,
    pub quantity: u32,
}

/// Snapshot of the caller's cart.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cart {
    pub items: Vec<CartItem>,
    pub total: Decimal,
}

impl Cart {
    /// Quantity of the given product, zero when absent.
    #[must_use]
    pub fn quantity_of(&self, product_id: u64) -> u32 {
        self.items
            .iter()
            .find(|item| item.product_id == product_id)
            .map_or(0, |item| item.quantity)
    }

    /// Returns `true` if the cart holds no line with a positive quantity.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.iter().all(|item| item.quantity == 0)
    }
}

/// A discount code as reported in admin stats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscountCode {
    pub code: String,
    pub discount_pct: u32,
    pub used: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redeemed_order_id: Option<u64>,
}

/// Aggregate sales statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stats {
    pub items_purchased: u64,
    pub gross_amount: Decimal,
    pub total_discount_amount: Decimal,
    pub net_amount: Decimal,
    #[serde(default)]
    pub discount_codes: Vec<DiscountCode>,
}

impl Stats {
    /// The unused code, if the server currently has one.
    #[must_use]
    pub fn active_code(&self) -> Option<&DiscountCode> {
        self.discount_codes.iter().find(|code| !code.used)
    }
}

/// Response of the admin "generate discount" call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedDiscount {
    pub code: String,
    pub discount_pct: u32,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
