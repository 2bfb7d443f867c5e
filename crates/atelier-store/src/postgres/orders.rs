//! Orders and payment reconciliation.
//!
//! `apply_payment` locks the order row with `SELECT ... FOR UPDATE` so that
//! a webhook and a client verification for the same order serialize. Stock
//! is decremented with a conditional update per line, in product id order
//! so that concurrent confirmations take product row locks in the same
//! sequence. A line that matches no row becomes a shortfall and the order
//! is flagged for review. Transactions Postgres aborts as deadlocked or
//! unserializable are retried a bounded number of times.

use super::rows::{
    HistoryRow, OrderItemRow, OrderRow, ProductRow, ORDER_COLUMNS, PRODUCT_COLUMNS,
};
use super::PgStore;
use crate::storage_error;
use async_trait::async_trait;
use atelier_core::order::{new_placed_order, placement_rejection, price_items};
use atelier_core::reconcile::{
    apply_cancellation, apply_confirmation, apply_failure, decide, Transition,
};
use atelier_core::store::{OrderStore, PaymentStore};
use atelier_core::{
    Buyer, Order, OrderLookup, OrderRef, OrderRequest, PaymentSignal, Product, ReconcileOutcome,
    ShopError, ShopResult, Shortfall, StatusUpdate,
};
use chrono::Utc;
use sqlx::PgConnection;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

const MAX_PAYMENT_ATTEMPTS: u32 = 3;
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(25);

/// Attach items and history to order rows, keeping row order
async fn hydrate(conn: &mut PgConnection, rows: Vec<OrderRow>) -> ShopResult<Vec<Order>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    let items = sqlx::query_as::<_, OrderItemRow>(
        "SELECT order_id, id, product_id, product_name, quantity, price_cents \
         FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(storage_error)?;

    let history = sqlx::query_as::<_, HistoryRow>(
        "SELECT order_id, status, notes, created_at \
         FROM order_status_history WHERE order_id = ANY($1) ORDER BY order_id, id",
    )
    .bind(&ids)
    .fetch_all(&mut *conn)
    .await
    .map_err(storage_error)?;

    let mut items_by_order: HashMap<Uuid, Vec<OrderItemRow>> = HashMap::new();
    for item in items {
        items_by_order.entry(item.order_id).or_default().push(item);
    }
    let mut history_by_order: HashMap<Uuid, Vec<HistoryRow>> = HashMap::new();
    for entry in history {
        history_by_order.entry(entry.order_id).or_default().push(entry);
    }

    rows.into_iter()
        .map(|row| {
            let items = items_by_order.remove(&row.id).unwrap_or_default();
            let history = history_by_order.remove(&row.id).unwrap_or_default();
            row.into_order(items, history)
        })
        .collect()
}

async fn fetch_one(conn: &mut PgConnection, row: Option<OrderRow>) -> ShopResult<Option<Order>> {
    match row {
        Some(row) => Ok(hydrate(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

/// Write back the mutable order columns and the newest history entry
async fn persist_transition(conn: &mut PgConnection, order: &Order) -> ShopResult<()> {
    sqlx::query(
        "UPDATE orders SET status = $2, payment_status = $3, provider_transaction_id = $4, \
         needs_review = $5, tracking_number = $6, carrier = $7, updated_at = $8 WHERE id = $1",
    )
    .bind(order.id)
    .bind(order.status.as_str())
    .bind(order.payment_status.as_str())
    .bind(&order.provider_transaction_id)
    .bind(order.needs_review)
    .bind(&order.tracking_number)
    .bind(&order.carrier)
    .bind(order.updated_at)
    .execute(&mut *conn)
    .await
    .map_err(storage_error)?;

    if let Some(entry) = order.status_history.last() {
        sqlx::query(
            "INSERT INTO order_status_history (order_id, status, notes, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(order.id)
        .bind(entry.status.as_str())
        .bind(&entry.notes)
        .bind(entry.created_at)
        .execute(&mut *conn)
        .await
        .map_err(storage_error)?;
    }
    Ok(())
}

async fn lock_order(conn: &mut PgConnection, lookup: &OrderLookup) -> ShopResult<Option<Order>> {
    let row = match lookup {
        OrderLookup::OrderId(id) => {
            let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
            sqlx::query_as::<_, OrderRow>(&sql)
                .bind(id)
                .fetch_optional(&mut *conn)
                .await
        }
        OrderLookup::PaymentReference(reference) => {
            let sql = format!(
                "SELECT {ORDER_COLUMNS} FROM orders WHERE id = \
                 (SELECT order_id FROM payment_references WHERE reference = $1) FOR UPDATE"
            );
            sqlx::query_as::<_, OrderRow>(&sql)
                .bind(reference)
                .fetch_optional(&mut *conn)
                .await
        }
    }
    .map_err(storage_error)?;
    fetch_one(conn, row).await
}

#[async_trait]
impl OrderStore for PgStore {
    #[instrument(skip(self, buyer, request), fields(user_id = %buyer.user_id))]
    async fn place_order(&self, buyer: &Buyer, request: &OrderRequest) -> ShopResult<Order> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let (owned,): (bool,) = sqlx::query_as(
            "SELECT EXISTS (SELECT 1 FROM addresses WHERE id = $1 AND user_id = $2)",
        )
        .bind(request.address_id)
        .bind(buyer.user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(storage_error)?;
        if !owned {
            return Err(ShopError::InvalidRequest("Invalid shipping address".to_string()));
        }

        let lines = request.merged_lines();
        let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1) ORDER BY id FOR SHARE");
        let products: Vec<Product> = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(&ids)
            .fetch_all(&mut *tx)
            .await
            .map_err(storage_error)?
            .into_iter()
            .map(Product::from)
            .collect();
        let (items, totals) = price_items(&lines, &products).map_err(placement_rejection)?;

        let order = new_placed_order(buyer, request.address_id, request.payment_method, items, totals);
        sqlx::query(
            "INSERT INTO orders (id, order_number, user_id, user_email, user_name, address_id, \
             subtotal_cents, shipping_cents, tax_cents, total_cents, status, payment_status, \
             payment_method, needs_review, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, FALSE, $14, $15)",
        )
        .bind(order.id)
        .bind(&order.order_number)
        .bind(order.user_id)
        .bind(&order.user_email)
        .bind(&order.user_name)
        .bind(order.address_id)
        .bind(order.subtotal.cents())
        .bind(order.shipping_cost.cents())
        .bind(order.tax.cents())
        .bind(order.total.cents())
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(order.payment_method.as_str())
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, position, product_name, \
                 quantity, price_cents) VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(item.id)
            .bind(order.id)
            .bind(item.product_id)
            .bind(position as i32)
            .bind(&item.product_name)
            .bind(item.quantity as i32)
            .bind(item.price.cents())
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        for entry in &order.status_history {
            sqlx::query(
                "INSERT INTO order_status_history (order_id, status, notes, created_at) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(order.id)
            .bind(entry.status.as_str())
            .bind(&entry.notes)
            .bind(entry.created_at)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        }

        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(buyer.user_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        debug!(order_id = %order.id, "Order placed");
        Ok(order)
    }

    async fn find_order(&self, id: Uuid) -> ShopResult<Option<Order>> {
        let mut conn = self.pool.acquire().await.map_err(storage_error)?;
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(storage_error)?;
        fetch_one(&mut conn, row).await
    }

    async fn find_order_by_payment_reference(&self, reference: &str) -> ShopResult<Option<Order>> {
        let mut conn = self.pool.acquire().await.map_err(storage_error)?;
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE id = \
             (SELECT order_id FROM payment_references WHERE reference = $1)"
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(reference)
            .fetch_optional(&mut *conn)
            .await
            .map_err(storage_error)?;
        fetch_one(&mut conn, row).await
    }

    async fn list_orders_for_user(&self, user_id: Uuid) -> ShopResult<Vec<Order>> {
        let mut conn = self.pool.acquire().await.map_err(storage_error)?;
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC");
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await
            .map_err(storage_error)?;
        hydrate(&mut conn, rows).await
    }

    async fn set_payment_reference(&self, order_id: Uuid, reference: &str) -> ShopResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let result = sqlx::query("UPDATE orders SET payment_reference = $2, updated_at = $3 WHERE id = $1")
            .bind(order_id)
            .bind(reference)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        if result.rows_affected() == 0 {
            return Err(ShopError::not_found("Order", order_id));
        }

        let claimed = sqlx::query(
            "INSERT INTO payment_references (reference, order_id, created_at) VALUES ($1, $2, $3) \
             ON CONFLICT (reference) DO UPDATE SET created_at = payment_references.created_at \
             WHERE payment_references.order_id = EXCLUDED.order_id",
        )
        .bind(reference)
        .bind(order_id)
        .bind(now)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;
        if claimed.rows_affected() == 0 {
            return Err(ShopError::Conflict(format!(
                "Payment reference {reference} belongs to another order"
            )));
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    #[instrument(skip(self, update), fields(status = %update.status))]
    async fn update_order_status(&self, id: Uuid, update: &StatusUpdate) -> ShopResult<Order> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        let mut order = lock_order(&mut *tx, &OrderLookup::OrderId(id))
            .await?
            .ok_or_else(|| ShopError::not_found("Order", id))?;

        order.apply_status_update(update);
        persist_transition(&mut *tx, &order).await?;

        tx.commit().await.map_err(storage_error)?;
        Ok(order)
    }
}

impl PgStore {
    async fn apply_payment_once(&self, signal: &PaymentSignal) -> ShopResult<ReconcileOutcome> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let Some(mut order) = lock_order(&mut *tx, &signal.lookup).await? else {
            return Ok(ReconcileOutcome::OrderNotFound);
        };
        let order_ref = OrderRef::from(&order);

        let outcome = match decide(order.status, order.payment_status, signal.outcome) {
            Transition::Confirm => {
                let mut shortfalls = Vec::new();
                for item in order.lines_by_product() {
                    let decremented = sqlx::query(
                        "UPDATE products SET stock = stock - $2, updated_at = now() \
                         WHERE id = $1 AND stock >= $2",
                    )
                    .bind(item.product_id)
                    .bind(item.quantity as i32)
                    .execute(&mut *tx)
                    .await
                    .map_err(storage_error)?
                    .rows_affected();
                    if decremented == 0 {
                        shortfalls.push(Shortfall {
                            product_id: item.product_id,
                            product_name: item.product_name.clone(),
                            quantity: item.quantity,
                        });
                    }
                }
                apply_confirmation(&mut order, signal, &shortfalls);
                persist_transition(&mut *tx, &order).await?;
                ReconcileOutcome::Confirmed {
                    order: order_ref,
                    shortfalls,
                }
            }
            Transition::MarkFailed => {
                apply_failure(&mut order, signal);
                persist_transition(&mut *tx, &order).await?;
                ReconcileOutcome::MarkedFailed { order: order_ref }
            }
            Transition::Cancel => {
                apply_cancellation(&mut order, signal);
                persist_transition(&mut *tx, &order).await?;
                ReconcileOutcome::Cancelled { order: order_ref }
            }
            Transition::Duplicate => ReconcileOutcome::Duplicate { order: order_ref },
            Transition::Ignore(reason) => ReconcileOutcome::Ignored {
                order: order_ref,
                reason,
            },
        };

        tx.commit().await.map_err(storage_error)?;
        Ok(outcome)
    }
}

#[async_trait]
impl PaymentStore for PgStore {
    #[instrument(skip(self, signal), fields(provider = signal.provider.name(), lookup = %signal.lookup))]
    async fn apply_payment(&self, signal: &PaymentSignal) -> ShopResult<ReconcileOutcome> {
        let mut delay = INITIAL_RETRY_DELAY;
        let mut attempt = 1;
        loop {
            match self.apply_payment_once(signal).await {
                Err(e) if e.is_retryable() && attempt < MAX_PAYMENT_ATTEMPTS => {
                    warn!(attempt, error = %e, "Payment transaction aborted, retrying in {:?}", delay);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }
}

