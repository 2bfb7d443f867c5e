//! # Admin Analytics

use crate::money::Money;
use crate::order::{OrderStatus, PaymentStatus};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Number of rows in the recent orders and top products lists
pub const ANALYTICS_LIST_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Analytics {
    pub overview: Overview,
    pub recent_orders: Vec<RecentOrder>,
    pub top_products: Vec<TopProduct>,
    pub orders_by_status: Vec<StatusCount>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Overview {
    pub total_orders: u64,
    /// Sum of totals over PAID orders
    pub total_revenue: Money,
    pub total_customers: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentOrder {
    pub id: Uuid,
    pub order_number: String,
    pub user_name: String,
    pub total: Money,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopProduct {
    pub product_id: Uuid,
    /// Current catalog name, or the frozen order-time name if deleted
    pub name: String,
    pub deleted: bool,
    pub total_sold: u64,
    pub order_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: u64,
}
