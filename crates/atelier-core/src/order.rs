//! # Order Types
//!
//! Orders, their line items and status history, plus the pure parts of
//! order placement: line merging, catalog checks, price freezing and
//! order-number generation.

use crate::cart::merge_quantities;
use crate::error::{ShopError, ShopResult};
use crate::money::Money;
use crate::pricing::OrderTotals;
use crate::product::Product;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Fulfilment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Placed,
    Confirmed,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Placed,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Placed => "PLACED",
            OrderStatus::Confirmed => "CONFIRMED",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
            OrderStatus::Refunded => "REFUNDED",
        }
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown order status: {s}"))
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Paid,
    Failed,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(PaymentStatus::Pending),
            "PAID" => Ok(PaymentStatus::Paid),
            "FAILED" => Ok(PaymentStatus::Failed),
            "REFUNDED" => Ok(PaymentStatus::Refunded),
            other => Err(format!("unknown payment status: {other}")),
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payment provider chosen at order time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentProvider {
    #[serde(alias = "stripe")]
    Stripe,
    #[serde(alias = "razorpay")]
    Razorpay,
    #[serde(alias = "dodo")]
    Dodo,
}

impl PaymentProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "STRIPE",
            PaymentProvider::Razorpay => "RAZORPAY",
            PaymentProvider::Dodo => "DODO",
        }
    }

    /// Lowercase name used for strategy registration and logging
    pub fn name(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "stripe",
            PaymentProvider::Razorpay => "razorpay",
            PaymentProvider::Dodo => "dodo",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            PaymentProvider::Stripe => "Stripe",
            PaymentProvider::Razorpay => "Razorpay",
            PaymentProvider::Dodo => "Dodo Payments",
        }
    }
}

impl FromStr for PaymentProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "stripe" => Ok(PaymentProvider::Stripe),
            "razorpay" => Ok(PaymentProvider::Razorpay),
            "dodo" => Ok(PaymentProvider::Dodo),
            other => Err(format!("unknown payment provider: {other}")),
        }
    }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frozen line item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub quantity: u32,
    /// Unit price at order time
    pub price: Money,
}

impl OrderItem {
    pub fn line_total(&self) -> Money {
        self.price * self.quantity
    }
}

/// Append-only status history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub status: OrderStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl StatusHistoryEntry {
    pub fn new(status: OrderStatus, notes: Option<String>) -> Self {
        Self {
            status,
            notes,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub user_email: String,
    pub user_name: String,
    pub address_id: Uuid,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub tax: Money,
    pub total: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_method: PaymentProvider,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_transaction_id: Option<String>,
    pub needs_review: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracking_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carrier: Option<String>,
    pub items: Vec<OrderItem>,
    /// Oldest first
    pub status_history: Vec<StatusHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn totals(&self) -> OrderTotals {
        OrderTotals {
            subtotal: self.subtotal,
            shipping_cost: self.shipping_cost,
            tax: self.tax,
            total: self.total,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == PaymentStatus::Paid
    }

    /// Idempotency key for one payment attempt. Every failed attempt adds a
    /// history entry, so a retry after a failure gets a fresh key while
    /// repeated requests within one attempt share it.
    pub fn payment_attempt_key(&self) -> String {
        format!("{}-{}", self.id, self.status_history.len())
    }

    /// Line items ordered by product id. Stores decrement stock in this
    /// order so concurrent confirmations lock product rows in one sequence.
    pub fn lines_by_product(&self) -> Vec<&OrderItem> {
        let mut lines: Vec<&OrderItem> = self.items.iter().collect();
        lines.sort_by_key(|item| item.product_id);
        lines
    }

    /// Refuse to start a checkout for an order that cannot be paid
    pub fn ensure_payable(&self) -> ShopResult<()> {
        if self.is_paid() {
            return Err(ShopError::InvalidRequest("Order is already paid".into()));
        }
        if self.status == OrderStatus::Cancelled {
            return Err(ShopError::InvalidRequest("Order is cancelled".into()));
        }
        if !self.total.is_positive() {
            return Err(ShopError::InvalidRequest(
                "Order total must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Apply an admin status change, appending history.
    ///
    /// A REFUNDED status on a paid order also refunds the payment.
    pub fn apply_status_update(&mut self, update: &StatusUpdate) {
        self.status = update.status;
        if update.tracking_number.is_some() {
            self.tracking_number = update.tracking_number.clone();
        }
        if update.carrier.is_some() {
            self.carrier = update.carrier.clone();
        }
        if update.status == OrderStatus::Refunded && self.is_paid() {
            self.payment_status = PaymentStatus::Refunded;
        }
        self.status_history
            .push(StatusHistoryEntry::new(update.status, update.notes.clone()));
        self.updated_at = Utc::now();
    }
}

/// Buyer snapshot captured at creation
#[derive(Debug, Clone, PartialEq)]
pub struct Buyer {
    pub user_id: Uuid,
    pub email: String,
    pub name: String,
}

/// A requested order line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    pub product_id: Uuid,
    pub quantity: u32,
}

fn positive_quantities(lines: &Vec<OrderLine>) -> Result<(), ValidationError> {
    if lines.iter().all(|l| l.quantity >= 1) {
        Ok(())
    } else {
        Err(ValidationError::new("quantity_must_be_positive"))
    }
}

/// `POST /api/orders` body
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub address_id: Uuid,
    #[validate(length(min = 1), custom = "positive_quantities")]
    pub items: Vec<OrderLine>,
    pub payment_method: PaymentProvider,
}

impl OrderRequest {
    /// Lines with duplicate products merged, first-seen order kept
    pub fn merged_lines(&self) -> Vec<OrderLine> {
        merge_quantities(self.items.iter().map(|l| (l.product_id, l.quantity)))
            .into_iter()
            .map(|(product_id, quantity)| OrderLine {
                product_id,
                quantity,
            })
            .collect()
    }
}

/// Admin status update body
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StatusUpdate {
    pub status: OrderStatus,
    pub notes: Option<String>,
    #[validate(length(min = 1))]
    pub tracking_number: Option<String>,
    #[validate(length(min = 1))]
    pub carrier: Option<String>,
}

/// Check merged lines against current products and freeze prices.
///
/// `products` must contain the rows for every requested product that
/// exists; a missing row means the product does not exist.
pub fn price_items(lines: &[OrderLine], products: &[Product]) -> ShopResult<(Vec<OrderItem>, OrderTotals)> {
    let mut items = Vec::with_capacity(lines.len());
    for line in lines {
        let product = products
            .iter()
            .find(|p| p.id == line.product_id)
            .ok_or_else(|| ShopError::not_found("Product", line.product_id))?;
        if !product.is_active {
            return Err(ShopError::ProductUnavailable {
                product_id: product.id,
            });
        }
        if !product.can_fulfil(line.quantity) {
            return Err(ShopError::InsufficientStock {
                product_id: product.id,
            });
        }
        items.push(OrderItem {
            id: Uuid::new_v4(),
            product_id: product.id,
            product_name: product.name.clone(),
            quantity: line.quantity,
            price: product.price,
        });
    }

    let subtotal = items.iter().map(OrderItem::line_total).sum();
    Ok((items, OrderTotals::from_subtotal(subtotal)))
}

/// Order placement answers 400 for every rejection, including references
/// to products or addresses that do not exist.
pub fn placement_rejection(err: ShopError) -> ShopError {
    match err {
        ShopError::NotFound { .. } => ShopError::InvalidRequest(err.to_string()),
        other => other,
    }
}

/// `LH{unix-millis}-{8 upper-case hex}`
pub fn generate_order_number(now: DateTime<Utc>) -> String {
    let simple = Uuid::new_v4().simple().to_string();
    format!(
        "LH{}-{}",
        now.timestamp_millis(),
        simple[..8].to_uppercase()
    )
}

/// Note on the first history entry of every order
pub const ORDER_PLACED_NOTE: &str = "Order placed successfully";

/// Build a new PLACED+PENDING order
pub fn new_placed_order(
    buyer: &Buyer,
    address_id: Uuid,
    payment_method: PaymentProvider,
    items: Vec<OrderItem>,
    totals: OrderTotals,
) -> Order {
    let now = Utc::now();
    Order {
        id: Uuid::new_v4(),
        order_number: generate_order_number(now),
        user_id: buyer.user_id,
        user_email: buyer.email.clone(),
        user_name: buyer.name.clone(),
        address_id,
        subtotal: totals.subtotal,
        shipping_cost: totals.shipping_cost,
        tax: totals.tax,
        total: totals.total,
        status: OrderStatus::Placed,
        payment_status: PaymentStatus::Pending,
        payment_method,
        payment_reference: None,
        provider_transaction_id: None,
        needs_review: false,
        tracking_number: None,
        carrier: None,
        items,
        status_history: vec![StatusHistoryEntry::new(
            OrderStatus::Placed,
            Some(ORDER_PLACED_NOTE.to_string()),
        )],
        created_at: now,
        updated_at: now,
    }
}

/// Push body sent to the owner after an admin status change
pub fn status_push_message(status: OrderStatus, tracking_number: Option<&str>) -> Option<String> {
    match status {
        OrderStatus::Confirmed => Some("Your order has been confirmed".to_string()),
        OrderStatus::Processing => Some("Your order is being prepared".to_string()),
        OrderStatus::Shipped => Some(match tracking_number {
            Some(t) => format!("Your order has been shipped (Tracking: {t})"),
            None => "Your order has been shipped".to_string(),
        }),
        OrderStatus::Delivered => Some("Your order has been delivered".to_string()),
        _ => None,
    }
}
