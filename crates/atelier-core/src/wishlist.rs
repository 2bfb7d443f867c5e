//! # Wishlist

use crate::money::Money;
use crate::product::Product;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistEntry {
    pub product_id: Uuid,
    pub product: WishlistProduct,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistProduct {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
    pub images: Vec<String>,
    pub style_code: String,
    pub stock: i32,
}

impl From<&Product> for WishlistProduct {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            price: p.price,
            images: p.images.clone(),
            style_code: p.style_code.clone(),
            stock: p.stock,
        }
    }
}

/// Result of a toggle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WishlistToggle {
    Added,
    Removed,
}

impl WishlistToggle {
    pub fn message(&self) -> &'static str {
        match self {
            WishlistToggle::Added => "Added to wishlist",
            WishlistToggle::Removed => "Removed from wishlist",
        }
    }
}
