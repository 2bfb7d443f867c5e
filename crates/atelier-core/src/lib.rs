//! # atelier-core
//!
//! Domain types and rules for the atelier luxury storefront.
//!
//! This crate provides:
//! - Catalog, cart, address, order and wishlist types
//! - `OrderTotals` pricing (shipping threshold, sales tax)
//! - The order/payment reconciliation rules and `PaymentReconciler`
//! - `PaymentStrategy` trait for payment providers
//! - Storage traits implemented by `atelier-store`
//! - `ShopError` for typed error handling
//!
//! ## Example
//!
//! ```rust,ignore
//! use atelier_core::{OrderLookup, PaymentOutcome, PaymentProvider, PaymentSignal, SignalSource};
//!
//! let signal = PaymentSignal::new(
//!     PaymentProvider::Stripe,
//!     OrderLookup::PaymentReference(session_id),
//!     PaymentOutcome::Succeeded,
//!     SignalSource::Webhook,
//! );
//! let outcome = reconciler.reconcile(&signal).await?;
//! ```

pub mod address;
pub mod analytics;
pub mod cart;
pub mod error;
pub mod money;
pub mod notify;
pub mod order;
pub mod pricing;
pub mod product;
pub mod reconcile;
pub mod seed;
pub mod store;
pub mod strategy;
pub mod user;
pub mod wishlist;

// Re-exports for convenience
pub use address::{Address, AddressPatch, NewAddress};
pub use analytics::Analytics;
pub use cart::{Cart, CartLine, MAX_ITEM_QUANTITY};
pub use error::{ShopError, ShopResult};
pub use money::{Currency, Money};
pub use notify::{BoxedPushNotifier, PushMessage, PushNotifier, PushReport};
pub use order::{
    Buyer, Order, OrderItem, OrderLine, OrderRequest, OrderStatus, PaymentProvider, PaymentStatus,
    StatusHistoryEntry, StatusUpdate,
};
pub use pricing::OrderTotals;
pub use product::{
    Category, NewCategory, NewProduct, Page, PageRequest, Product, ProductPatch, ProductQuery,
    ProductWithCounts,
};
pub use reconcile::{
    OrderLookup, OrderRef, PaymentOutcome, PaymentReconciler, PaymentSignal, ReconcileOutcome,
    Shortfall, SignalSource,
};
pub use seed::SeedData;
pub use store::{SharedStore, Store};
pub use strategy::{
    AppRedirects, BoxedPaymentStrategy, CheckoutSession, CheckoutUrls, PaymentStrategy,
    PaymentStrategySelector, ReturnParams, WebhookEvent, WebhookEventType, WebhookHeaders,
};
pub use user::{NewUser, Role, User};
pub use wishlist::{WishlistEntry, WishlistToggle};
