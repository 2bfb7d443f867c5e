//! Cart lines and wishlist entries.

use super::rows::{ProductRow, PRODUCT_COLUMNS};
use super::PgStore;
use crate::storage_error;
use async_trait::async_trait;
use atelier_core::cart::{check_add, check_sync};
use atelier_core::store::{CartStore, CatalogStore, WishlistStore};
use atelier_core::wishlist::WishlistProduct;
use atelier_core::{CartLine, Product, ShopError, ShopResult, WishlistEntry, WishlistToggle};
use chrono::{DateTime, Utc};
use uuid::Uuid;

fn to_line((product_id, quantity): (Uuid, i32)) -> CartLine {
    CartLine {
        product_id,
        quantity: u32::try_from(quantity).unwrap_or_default(),
    }
}

#[async_trait]
impl CartStore for PgStore {
    async fn cart_lines(&self, user_id: Uuid) -> ShopResult<Vec<CartLine>> {
        let rows: Vec<(Uuid, i32)> = sqlx::query_as(
            "SELECT product_id, quantity FROM cart_items WHERE user_id = $1 ORDER BY created_at",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(rows.into_iter().map(to_line).collect())
    }

    async fn add_to_cart(&self, user_id: Uuid, line: CartLine) -> ShopResult<CartLine> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let product: Product = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(line.product_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| ShopError::not_found("Product", line.product_id))?
            .into();

        let existing: Option<(i32,)> = sqlx::query_as(
            "SELECT quantity FROM cart_items WHERE user_id = $1 AND product_id = $2 FOR UPDATE",
        )
        .bind(user_id)
        .bind(line.product_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(storage_error)?;
        let existing = existing.map_or(0, |(q,)| u32::try_from(q).unwrap_or_default());

        let quantity = check_add(&product, existing, line.quantity)?;
        sqlx::query(
            "INSERT INTO cart_items (user_id, product_id, quantity) VALUES ($1, $2, $3) \
             ON CONFLICT (user_id, product_id) DO UPDATE SET quantity = EXCLUDED.quantity",
        )
        .bind(user_id)
        .bind(line.product_id)
        .bind(quantity as i32)
        .execute(&mut *tx)
        .await
        .map_err(storage_error)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(CartLine {
            product_id: line.product_id,
            quantity,
        })
    }

    async fn replace_cart(&self, user_id: Uuid, lines: Vec<CartLine>) -> ShopResult<Vec<CartLine>> {
        let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let products = self.find_products(&ids).await?;
        let merged = check_sync(&lines, &products)?;

        let mut tx = self.pool.begin().await.map_err(storage_error)?;
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        for line in &merged {
            sqlx::query("INSERT INTO cart_items (user_id, product_id, quantity) VALUES ($1, $2, $3)")
                .bind(user_id)
                .bind(line.product_id)
                .bind(line.quantity as i32)
                .execute(&mut *tx)
                .await
                .map_err(storage_error)?;
        }
        tx.commit().await.map_err(storage_error)?;
        Ok(merged)
    }

    async fn clear_cart(&self, user_id: Uuid) -> ShopResult<u64> {
        let result = sqlx::query("DELETE FROM cart_items WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(result.rows_affected())
    }
}

#[derive(sqlx::FromRow)]
struct WishlistRow {
    #[sqlx(flatten)]
    product: ProductRow,
    added_at: DateTime<Utc>,
}

#[async_trait]
impl WishlistStore for PgStore {
    async fn list_wishlist(&self, user_id: Uuid) -> ShopResult<Vec<WishlistEntry>> {
        let columns = PRODUCT_COLUMNS
            .split(", ")
            .map(|c| format!("p.{}", c.trim()))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT {columns}, w.created_at AS added_at FROM wishlist_items w \
             JOIN products p ON p.id = w.product_id \
             WHERE w.user_id = $1 ORDER BY w.created_at DESC"
        );
        let rows = sqlx::query_as::<_, WishlistRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let product = Product::from(row.product);
                WishlistEntry {
                    product_id: product.id,
                    product: WishlistProduct::from(&product),
                    created_at: row.added_at,
                }
            })
            .collect())
    }

    async fn toggle_wishlist(&self, user_id: Uuid, product_id: Uuid) -> ShopResult<WishlistToggle> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(storage_error)?;
        if !exists {
            return Err(ShopError::not_found("Product", product_id));
        }

        let removed = sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?
            .rows_affected();

        let toggle = if removed > 0 {
            WishlistToggle::Removed
        } else {
            sqlx::query(
                "INSERT INTO wishlist_items (user_id, product_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(user_id)
            .bind(product_id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
            WishlistToggle::Added
        };

        tx.commit().await.map_err(storage_error)?;
        Ok(toggle)
    }
}
