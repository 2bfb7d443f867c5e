//! # Storage Traits
//!
//! Persistence seams, one trait per aggregate. `atelier-store` provides a
//! PostgreSQL implementation and an in-memory one; handlers only ever see
//! `Arc<dyn Store>`.
//!
//! Owner-scoped lookups (addresses, carts, wishlists) take the caller's
//! user id and behave as if rows of other users did not exist.

use crate::address::{Address, AddressPatch, NewAddress};
use crate::analytics::Analytics;
use crate::cart::CartLine;
use crate::error::ShopResult;
use crate::order::{Buyer, Order, OrderRequest, StatusUpdate};
use crate::product::{
    Category, NewCategory, NewProduct, Page, PageRequest, Product, ProductPatch, ProductQuery,
    ProductWithCounts,
};
use crate::reconcile::{PaymentSignal, ReconcileOutcome};
use crate::user::{NewUser, User};
use crate::wishlist::{WishlistEntry, WishlistToggle};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new account; a taken email is a `Conflict`
    async fn create_user(&self, user: NewUser) -> ShopResult<User>;

    async fn find_user(&self, id: Uuid) -> ShopResult<Option<User>>;

    async fn find_user_by_email(&self, email: &str) -> ShopResult<Option<User>>;

    /// Create or update an account by email (used for seeding admins)
    async fn upsert_user(&self, user: NewUser) -> ShopResult<User>;
}

#[async_trait]
pub trait AddressStore: Send + Sync {
    /// Default first, then newest first
    async fn list_addresses(&self, user_id: Uuid) -> ShopResult<Vec<Address>>;

    async fn find_address(&self, user_id: Uuid, id: Uuid) -> ShopResult<Option<Address>>;

    /// The first address of a user becomes the default; `is_default`
    /// unsets the previous default.
    async fn create_address(&self, user_id: Uuid, address: NewAddress) -> ShopResult<Address>;

    async fn update_address(&self, user_id: Uuid, id: Uuid, patch: AddressPatch) -> ShopResult<Address>;

    /// Refused while an order references the address. Deleting the default
    /// promotes the newest remaining address.
    async fn delete_address(&self, user_id: Uuid, id: Uuid) -> ShopResult<()>;

    async fn set_default_address(&self, user_id: Uuid, id: Uuid) -> ShopResult<Address>;
}

#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Active products only, newest first
    async fn list_products(&self, query: ProductQuery) -> ShopResult<Page<Product>>;

    /// Every product, with order-item and wishlist counters
    async fn list_products_with_counts(&self, page: PageRequest) -> ShopResult<Page<ProductWithCounts>>;

    async fn find_product(&self, id: Uuid) -> ShopResult<Option<Product>>;

    async fn find_products(&self, ids: &[Uuid]) -> ShopResult<Vec<Product>>;

    /// A taken style code is a `Conflict`
    async fn create_product(&self, product: NewProduct) -> ShopResult<Product>;

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> ShopResult<Product>;

    /// Refused with `Conflict` while order items reference the product
    async fn delete_product(&self, id: Uuid) -> ShopResult<()>;

    /// Ordered by display position
    async fn list_categories(&self) -> ShopResult<Vec<Category>>;

    /// A taken slug is a `Conflict`
    async fn create_category(&self, category: NewCategory) -> ShopResult<Category>;

    /// Create or update by slug (seeding)
    async fn upsert_category(&self, category: NewCategory) -> ShopResult<Category>;
}

#[async_trait]
pub trait CartStore: Send + Sync {
    async fn cart_lines(&self, user_id: Uuid) -> ShopResult<Vec<CartLine>>;

    /// Add units to a line, creating it if needed. Returns the updated line.
    async fn add_to_cart(&self, user_id: Uuid, line: CartLine) -> ShopResult<CartLine>;

    /// Replace the whole cart after validating every line
    async fn replace_cart(&self, user_id: Uuid, lines: Vec<CartLine>) -> ShopResult<Vec<CartLine>>;

    /// Returns the number of removed lines
    async fn clear_cart(&self, user_id: Uuid) -> ShopResult<u64>;
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Validate and insert a PLACED + PENDING order and clear the buyer's
    /// cart, all or nothing. Stock is checked, never decremented here.
    async fn place_order(&self, buyer: &Buyer, request: &OrderRequest) -> ShopResult<Order>;

    async fn find_order(&self, id: Uuid) -> ShopResult<Option<Order>>;

    async fn find_order_by_payment_reference(&self, reference: &str) -> ShopResult<Option<Order>>;

    /// Newest first
    async fn list_orders_for_user(&self, user_id: Uuid) -> ShopResult<Vec<Order>>;

    /// Record the provider session / order / checkout id used for lookups
    async fn set_payment_reference(&self, order_id: Uuid, reference: &str) -> ShopResult<()>;

    async fn update_order_status(&self, id: Uuid, update: &StatusUpdate) -> ShopResult<Order>;
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Apply a provider signal atomically under a lock on the order row.
    async fn apply_payment(&self, signal: &PaymentSignal) -> ShopResult<ReconcileOutcome>;
}

#[async_trait]
pub trait WishlistStore: Send + Sync {
    /// Newest first
    async fn list_wishlist(&self, user_id: Uuid) -> ShopResult<Vec<WishlistEntry>>;

    async fn toggle_wishlist(&self, user_id: Uuid, product_id: Uuid) -> ShopResult<WishlistToggle>;
}

#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// Upsert by token; a token moves to the latest user that registers it
    async fn register_device(&self, user_id: Uuid, token: &str, platform: Option<&str>) -> ShopResult<()>;

    async fn device_tokens(&self, user_id: Uuid) -> ShopResult<Vec<String>>;

    async fn remove_device_tokens(&self, tokens: &[String]) -> ShopResult<u64>;
}

#[async_trait]
pub trait AnalyticsStore: Send + Sync {
    async fn analytics(&self) -> ShopResult<Analytics>;
}

/// Everything the HTTP layer needs from persistence
#[async_trait]
pub trait Store:
    UserStore
    + AddressStore
    + CatalogStore
    + CartStore
    + OrderStore
    + PaymentStore
    + WishlistStore
    + DeviceStore
    + AnalyticsStore
{
    /// Backend name for logs and `/health`
    fn backend(&self) -> &'static str;

    async fn ping(&self) -> ShopResult<()>;
}

pub type SharedStore = Arc<dyn Store>;
