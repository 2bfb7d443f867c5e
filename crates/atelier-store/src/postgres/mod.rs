//! # PostgreSQL Store
//!
//! `PgStore` implements every storage trait over one `PgPool`. Queries are
//! checked at runtime (`query_as::<_, Row>`) so the crate builds without a
//! live database. Multi-statement operations run in a transaction.

mod accounts;
mod analytics;
mod catalog;
mod orders;
mod rows;
mod shopping;

use crate::storage_error;
use async_trait::async_trait;
use atelier_core::{ShopResult, Store};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::Duration;
use tracing::{info, instrument};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Open a pool against `database_url`
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str, max_connections: u32) -> ShopResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(storage_error)?;
        info!(max_connections, "PostgreSQL pool ready");
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded migrations
    pub async fn migrate(&self) -> ShopResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| atelier_core::ShopError::Storage(format!("migration failed: {e}")))?;
        info!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Store for PgStore {
    fn backend(&self) -> &'static str {
        "postgres"
    }

    async fn ping(&self) -> ShopResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
