//! Products and categories.

use super::rows::{CategoryRow, ProductCountsRow, ProductRow, CATEGORY_COLUMNS, PRODUCT_COLUMNS};
use super::PgStore;
use crate::storage_error;
use async_trait::async_trait;
use atelier_core::store::CatalogStore;
use atelier_core::{
    Category, NewCategory, NewProduct, Page, PageRequest, Product, ProductPatch, ProductQuery,
    ProductWithCounts, ShopError, ShopResult,
};
use chrono::Utc;
use sqlx::{Postgres, QueryBuilder};
use tracing::instrument;
use uuid::Uuid;

fn style_code_conflict(err: sqlx::Error) -> ShopError {
    match storage_error(err) {
        ShopError::Conflict(_) => ShopError::Conflict("Style code already exists".to_string()),
        ShopError::InvalidRequest(_) => ShopError::InvalidRequest("Category not found".to_string()),
        other => other,
    }
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &ProductQuery) {
    builder.push(" WHERE is_active");
    if let Some(category_id) = query.category_id {
        builder.push(" AND category_id = ").push_bind(category_id);
    }
    if query.featured_only {
        builder.push(" AND is_featured");
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    #[instrument(skip(self))]
    async fn list_products(&self, query: ProductQuery) -> ShopResult<Page<Product>> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_filters(&mut count, &query);
        let (total,): (i64,) = count
            .build_query_as()
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        let mut select = QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        push_filters(&mut select, &query);
        select
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(i64::from(query.page.limit))
            .push(" OFFSET ")
            .push_bind(query.page.offset() as i64);
        let rows: Vec<ProductRow> = select
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(Page {
            items: rows.into_iter().map(Product::from).collect(),
            request: query.page,
            total: total as u64,
        })
    }

    async fn list_products_with_counts(&self, page: PageRequest) -> ShopResult<Page<ProductWithCounts>> {
        let (total,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM products")
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;

        let sql = format!(
            "SELECT {PRODUCT_COLUMNS}, \
             (SELECT COUNT(*) FROM order_items oi WHERE oi.product_id = products.id) AS order_item_count, \
             (SELECT COUNT(*) FROM wishlist_items w WHERE w.product_id = products.id) AS wishlist_count \
             FROM products ORDER BY created_at DESC LIMIT $1 OFFSET $2"
        );
        let rows = sqlx::query_as::<_, ProductCountsRow>(&sql)
            .bind(i64::from(page.limit))
            .bind(page.offset() as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;

        Ok(Page {
            items: rows
                .into_iter()
                .map(|row| ProductWithCounts {
                    product: row.product.into(),
                    order_item_count: row.order_item_count as u64,
                    wishlist_count: row.wishlist_count as u64,
                })
                .collect(),
            request: page,
            total: total as u64,
        })
    }

    async fn find_product(&self, id: Uuid) -> ShopResult<Option<Product>> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(row.map(Product::from))
    }

    async fn find_products(&self, ids: &[Uuid]) -> ShopResult<Vec<Product>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(ids)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(rows.into_iter().map(Product::from).collect())
    }

    #[instrument(skip(self, product), fields(style_code = %product.style_code))]
    async fn create_product(&self, product: NewProduct) -> ShopResult<Product> {
        let p = product.into_product();
        let sql = format!(
            "INSERT INTO products ({PRODUCT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(p.id)
            .bind(&p.name)
            .bind(&p.style_code)
            .bind(&p.description)
            .bind(p.price.cents())
            .bind(p.stock)
            .bind(p.category_id)
            .bind(&p.materials)
            .bind(&p.dimensions)
            .bind(&p.care_instructions)
            .bind(&p.images)
            .bind(p.is_active)
            .bind(p.is_featured)
            .bind(p.created_at)
            .bind(p.updated_at)
            .fetch_one(&self.pool)
            .await
            .map_err(style_code_conflict)?;
        Ok(row.into())
    }

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> ShopResult<Product> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1 FOR UPDATE");
        let mut p: Product = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(storage_error)?
            .ok_or_else(|| ShopError::not_found("Product", id))?
            .into();
        p.apply(patch);

        let sql = format!(
            "UPDATE products SET name = $2, style_code = $3, description = $4, price_cents = $5, \
             stock = $6, category_id = $7, materials = $8, dimensions = $9, care_instructions = $10, \
             images = $11, is_active = $12, is_featured = $13, updated_at = $14 \
             WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
        );
        let row = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(p.id)
            .bind(&p.name)
            .bind(&p.style_code)
            .bind(&p.description)
            .bind(p.price.cents())
            .bind(p.stock)
            .bind(p.category_id)
            .bind(&p.materials)
            .bind(&p.dimensions)
            .bind(&p.care_instructions)
            .bind(&p.images)
            .bind(p.is_active)
            .bind(p.is_featured)
            .bind(Utc::now())
            .fetch_one(&mut *tx)
            .await
            .map_err(style_code_conflict)?;

        tx.commit().await.map_err(storage_error)?;
        Ok(row.into())
    }

    async fn delete_product(&self, id: Uuid) -> ShopResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage_error)?;

        let (referenced,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM order_items WHERE product_id = $1)")
                .bind(id)
                .fetch_one(&mut *tx)
                .await
                .map_err(storage_error)?;
        if referenced {
            return Err(ShopError::Conflict(
                "Product is referenced by existing orders".to_string(),
            ));
        }

        // cart and wishlist rows cascade
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(storage_error)?;
        if result.rows_affected() == 0 {
            return Err(ShopError::not_found("Product", id));
        }

        tx.commit().await.map_err(storage_error)?;
        Ok(())
    }

    async fn list_categories(&self) -> ShopResult<Vec<Category>> {
        let sql = format!("SELECT {CATEGORY_COLUMNS} FROM categories ORDER BY display_order, name");
        let rows = sqlx::query_as::<_, CategoryRow>(&sql)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(rows.into_iter().map(Category::from).collect())
    }

    async fn create_category(&self, category: NewCategory) -> ShopResult<Category> {
        let c = category.into_category();
        let sql = format!(
            "INSERT INTO categories ({CATEGORY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             RETURNING {CATEGORY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(c.id)
            .bind(&c.name)
            .bind(&c.slug)
            .bind(&c.description)
            .bind(&c.image_url)
            .bind(c.order)
            .bind(c.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| match storage_error(e) {
                ShopError::Conflict(_) => ShopError::Conflict("Category slug already exists".to_string()),
                other => other,
            })?;
        Ok(row.into())
    }

    async fn upsert_category(&self, category: NewCategory) -> ShopResult<Category> {
        let c = category.into_category();
        let sql = format!(
            "INSERT INTO categories ({CATEGORY_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (slug) DO UPDATE SET name = EXCLUDED.name, \
             description = EXCLUDED.description, image_url = EXCLUDED.image_url, \
             display_order = EXCLUDED.display_order \
             RETURNING {CATEGORY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(c.id)
            .bind(&c.name)
            .bind(&c.slug)
            .bind(&c.description)
            .bind(&c.image_url)
            .bind(c.order)
            .bind(c.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(row.into())
    }
}
