//! # Pricing
//!
//! Order totals: free shipping above the threshold, flat rate otherwise,
//! and sales tax on the subtotal rounded half-up to the cent.

use crate::money::Money;
use serde::Serialize;

/// Subtotals strictly above this ship free ($500.00)
pub const FREE_SHIPPING_THRESHOLD: Money = Money::from_cents(50_000);

/// Flat shipping rate below the threshold ($25.00)
pub const FLAT_SHIPPING: Money = Money::from_cents(2_500);

/// Tax rate in basis points (8%)
pub const TAX_RATE_BPS: i64 = 800;

/// Monetary breakdown of an order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderTotals {
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub tax: Money,
    pub total: Money,
}

impl OrderTotals {
    pub fn from_subtotal(subtotal: Money) -> Self {
        let shipping_cost = if subtotal > FREE_SHIPPING_THRESHOLD {
            Money::ZERO
        } else {
            FLAT_SHIPPING
        };
        let tax = Money::from_cents((subtotal.cents() * TAX_RATE_BPS + 5_000) / 10_000);

        Self {
            subtotal,
            shipping_cost,
            tax,
            total: subtotal + shipping_cost + tax,
        }
    }
}
