//! # Cart
//!
//! Per-user cart lines and the rules applied when lines are added or the
//! whole cart is replaced from a client.

use crate::error::{ShopError, ShopResult};
use crate::money::Money;
use crate::product::Product;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

/// Maximum units of one product per cart line
pub const MAX_ITEM_QUANTITY: u32 = 10;

/// A product/quantity pair as sent by clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    pub product_id: Uuid,
    #[validate(range(min = 1, max = 10))]
    pub quantity: u32,
}

/// Cart line joined with the current product data
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: Uuid,
    pub quantity: u32,
    pub product: CartProduct,
    pub line_total: Money,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartProduct {
    pub id: Uuid,
    pub name: String,
    pub price: Money,
    pub images: Vec<String>,
    pub stock: i32,
    pub is_active: bool,
}

impl From<&Product> for CartProduct {
    fn from(p: &Product) -> Self {
        Self {
            id: p.id,
            name: p.name.clone(),
            price: p.price,
            images: p.images.clone(),
            stock: p.stock,
            is_active: p.is_active,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub user_id: Uuid,
    pub items: Vec<CartItem>,
    pub subtotal: Money,
    pub item_count: u32,
}

impl Cart {
    /// Join stored lines with their products. Lines whose product has
    /// disappeared are skipped.
    pub fn assemble(user_id: Uuid, lines: &[CartLine], products: &[Product]) -> Self {
        let items: Vec<CartItem> = lines
            .iter()
            .filter_map(|line| {
                let product = products.iter().find(|p| p.id == line.product_id)?;
                Some(CartItem {
                    product_id: line.product_id,
                    quantity: line.quantity,
                    product: CartProduct::from(product),
                    line_total: product.price * line.quantity,
                })
            })
            .collect();

        Self {
            user_id,
            subtotal: items.iter().map(|i| i.line_total).sum(),
            item_count: items.iter().map(|i| i.quantity).sum(),
            items,
        }
    }
}

/// Validate adding `add` units on top of `existing` units already in the
/// cart. Returns the new line quantity.
pub fn check_add(product: &Product, existing: u32, add: u32) -> ShopResult<u32> {
    if add == 0 || add > MAX_ITEM_QUANTITY {
        return Err(ShopError::InvalidRequest(format!(
            "Quantity must be between 1 and {MAX_ITEM_QUANTITY}"
        )));
    }
    if !product.is_active {
        return Err(ShopError::ProductUnavailable {
            product_id: product.id,
        });
    }
    let quantity = existing + add;
    if quantity > MAX_ITEM_QUANTITY {
        return Err(ShopError::InvalidRequest(format!(
            "Cannot add more than {MAX_ITEM_QUANTITY} items"
        )));
    }
    if !product.can_fulfil(quantity) {
        return Err(ShopError::InsufficientStock {
            product_id: product.id,
        });
    }
    Ok(quantity)
}

/// Sum quantities per product, preserving first-seen order.
pub fn merge_quantities(pairs: impl IntoIterator<Item = (Uuid, u32)>) -> Vec<(Uuid, u32)> {
    let mut order: Vec<Uuid> = Vec::new();
    let mut totals: BTreeMap<Uuid, u32> = BTreeMap::new();
    for (product_id, quantity) in pairs {
        let entry = totals.entry(product_id).or_insert_with(|| {
            order.push(product_id);
            0
        });
        *entry = entry.saturating_add(quantity);
    }
    order
        .into_iter()
        .map(|product_id| (product_id, totals[&product_id]))
        .collect()
}

/// Merge duplicate product lines
pub fn merge_lines(lines: &[CartLine]) -> Vec<CartLine> {
    merge_quantities(lines.iter().map(|l| (l.product_id, l.quantity)))
        .into_iter()
        .map(|(product_id, quantity)| CartLine {
            product_id,
            quantity,
        })
        .collect()
}

/// Validate a full replacement cart against the catalog.
pub fn check_sync(lines: &[CartLine], products: &[Product]) -> ShopResult<Vec<CartLine>> {
    let merged = merge_lines(lines);
    for line in &merged {
        let product = products
            .iter()
            .find(|p| p.id == line.product_id)
            .ok_or_else(|| ShopError::not_found("Product", line.product_id))?;
        check_add(product, 0, line.quantity)?;
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::NewProduct;

    fn product(stock: i32) -> Product {
        serde_json::from_value::<NewProduct>(serde_json::json!({
            "name": "Silk Scarf",
            "styleCode": "SS-9",
            "description": "Twill silk",
            "price": 180.0,
            "stock": stock,
            "materials": ["Silk"],
            "dimensions": "90 x 90 cm",
            "careInstructions": "Dry clean",
            "images": ["https://cdn.atelier.shop/ss-9.jpg"]
        }))
        .unwrap()
        .into_product()
    }

    #[test]
    fn test_add_respects_line_maximum() {
        let p = product(50);
        assert_eq!(check_add(&p, 4, 6).unwrap(), 10);
        assert!(matches!(
            check_add(&p, 5, 6),
            Err(ShopError::InvalidRequest(_))
        ));
        assert!(check_add(&p, 0, 11).is_err());
    }

    #[test]
    fn test_add_checks_stock_and_activity() {
        let mut p = product(2);
        assert!(matches!(
            check_add(&p, 1, 2),
            Err(ShopError::InsufficientStock { .. })
        ));

        p.is_active = false;
        assert!(matches!(
            check_add(&p, 0, 1),
            Err(ShopError::ProductUnavailable { .. })
        ));
    }

    #[test]
    fn test_sync_merges_duplicates() {
        let p = product(20);
        let lines = vec![
            CartLine { product_id: p.id, quantity: 3 },
            CartLine { product_id: p.id, quantity: 4 },
        ];
        let merged = check_sync(&lines, std::slice::from_ref(&p)).unwrap();
        assert_eq!(merged, vec![CartLine { product_id: p.id, quantity: 7 }]);

        let too_many = vec![
            CartLine { product_id: p.id, quantity: 6 },
            CartLine { product_id: p.id, quantity: 6 },
        ];
        assert!(check_sync(&too_many, &[p]).is_err());
    }

    #[test]
    fn test_assemble_totals() {
        let p = product(5);
        let cart = Cart::assemble(
            Uuid::new_v4(),
            &[CartLine { product_id: p.id, quantity: 2 }],
            &[p],
        );
        assert_eq!(cart.subtotal, Money::from_cents(36_000));
        assert_eq!(cart.item_count, 2);
    }
}
