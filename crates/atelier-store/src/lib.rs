//! # atelier-store
//!
//! Implementations of the `atelier_core::store` traits.
//!
//! - [`PgStore`] - PostgreSQL through sqlx, migrations embedded
//! - [`MemoryStore`] - process memory, for development and tests
//!
//! ```rust,ignore
//! let store = PgStore::connect(&database_url, 10).await?;
//! store.migrate().await?;
//! let shared: SharedStore = Arc::new(store);
//! ```

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use atelier_core::{SeedData, ShopError, ShopResult, Store};
use atelier_core::user::{NewUser, Role};
use tracing::info;

/// SQLSTATE codes for transactions Postgres aborted and that may succeed on retry
const RETRYABLE_SQLSTATES: [&str; 2] = ["40001", "40P01"];

/// Map a sqlx error onto the domain error
pub(crate) fn storage_error(err: sqlx::Error) -> ShopError {
    match &err {
        sqlx::Error::Database(db)
            if db.code().is_some_and(|code| RETRYABLE_SQLSTATES.contains(&code.as_ref())) =>
        {
            ShopError::Contention(db.message().to_string())
        }
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            ShopError::Conflict(db.message().to_string())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
            ShopError::InvalidRequest(db.message().to_string())
        }
        sqlx::Error::Database(db) if db.is_check_violation() => {
            ShopError::InvalidRequest(db.message().to_string())
        }
        _ => ShopError::Storage(err.to_string()),
    }
}

/// Load seed data into any store. Categories and products are upserted by
/// slug and style code so that repeated runs converge.
pub async fn apply_seed(store: &dyn Store, seed: SeedData, admin_password_hash: Option<String>) -> ShopResult<()> {
    if let (Some(admin), Some(password_hash)) = (seed.admin, admin_password_hash) {
        store
            .upsert_user(NewUser {
                email: admin.email,
                password_hash,
                first_name: admin.first_name,
                last_name: admin.last_name,
                phone: None,
                role: Role::Admin,
            })
            .await?;
    }

    let mut categories = Vec::with_capacity(seed.categories.len());
    for category in seed.categories {
        categories.push(store.upsert_category(category).await?);
    }

    let mut created = 0usize;
    for product in seed.products {
        match store.create_product(product).await {
            Ok(_) => created += 1,
            Err(ShopError::Conflict(_)) => {}
            Err(e) => return Err(e),
        }
    }

    info!(categories = categories.len(), products = created, "Seed data applied");
    Ok(())
}
