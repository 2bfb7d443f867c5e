//! Admin dashboard aggregates.

use super::PgStore;
use crate::storage_error;
use async_trait::async_trait;
use atelier_core::analytics::{Overview, RecentOrder, StatusCount, TopProduct, ANALYTICS_LIST_SIZE};
use atelier_core::store::AnalyticsStore;
use atelier_core::{Analytics, Money, ShopError, ShopResult};
use chrono::{DateTime, Utc};
use std::str::FromStr;
use uuid::Uuid;

#[derive(sqlx::FromRow)]
struct RecentRow {
    id: Uuid,
    order_number: String,
    user_name: String,
    total_cents: i64,
    status: String,
    payment_status: String,
    created_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct TopRow {
    product_id: Uuid,
    name: String,
    deleted: bool,
    total_sold: i64,
    order_count: i64,
}

fn parse<T: FromStr<Err = String>>(value: &str) -> ShopResult<T> {
    value.parse().map_err(ShopError::Storage)
}

#[async_trait]
impl AnalyticsStore for PgStore {
    async fn analytics(&self) -> ShopResult<Analytics> {
        let (total_orders, total_revenue): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COALESCE(SUM(total_cents) FILTER (WHERE payment_status = 'PAID'), 0)::BIGINT \
             FROM orders",
        )
        .fetch_one(&self.pool)
        .await
        .map_err(storage_error)?;

        let (total_customers,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE role = 'CUSTOMER'")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        let recent = sqlx::query_as::<_, RecentRow>(
            "SELECT id, order_number, user_name, total_cents, status, payment_status, created_at \
             FROM orders ORDER BY created_at DESC LIMIT $1",
        )
        .bind(ANALYTICS_LIST_SIZE as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        // Products deleted since keep the name frozen on their order items
        let top = sqlx::query_as::<_, TopRow>(
            "SELECT oi.product_id, COALESCE(p.name, MAX(oi.product_name)) AS name, \
             (p.id IS NULL) AS deleted, SUM(oi.quantity)::BIGINT AS total_sold, \
             COUNT(*) AS order_count \
             FROM order_items oi LEFT JOIN products p ON p.id = oi.product_id \
             GROUP BY oi.product_id, p.id, p.name \
             ORDER BY total_sold DESC, name LIMIT $1",
        )
        .bind(ANALYTICS_LIST_SIZE as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;

        let by_status: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM orders GROUP BY status ORDER BY status")
                .fetch_all(&self.pool)
                .await
                .map_err(storage_error)?;

        let recent_orders = recent
            .into_iter()
            .map(|r| {
                Ok(RecentOrder {
                    status: parse(&r.status)?,
                    payment_status: parse(&r.payment_status)?,
                    id: r.id,
                    order_number: r.order_number,
                    user_name: r.user_name,
                    total: Money::from_cents(r.total_cents),
                    created_at: r.created_at,
                })
            })
            .collect::<ShopResult<Vec<_>>>()?;

        let orders_by_status = by_status
            .into_iter()
            .map(|(status, count)| {
                Ok(StatusCount {
                    status: parse(&status)?,
                    count: count as u64,
                })
            })
            .collect::<ShopResult<Vec<_>>>()?;

        Ok(Analytics {
            overview: Overview {
                total_orders: total_orders as u64,
                total_revenue: Money::from_cents(total_revenue),
                total_customers: total_customers as u64,
            },
            recent_orders,
            top_products: top
                .into_iter()
                .map(|t| TopProduct {
                    product_id: t.product_id,
                    name: t.name,
                    deleted: t.deleted,
                    total_sold: t.total_sold as u64,
                    order_count: t.order_count as u64,
                })
                .collect(),
            orders_by_status,
        })
    }
}
