//! # atelier-api
//!
//! HTTP API layer for the atelier storefront.
//!
//! This crate provides:
//! - Axum-based HTTP server with bearer-token auth
//! - REST endpoints for catalog, cart, addresses, orders and wishlist
//! - Payment checkout, return and webhook endpoints feeding the reconciler
//! - Push delivery (FCM or log-only) and product image uploads
//!
//! ## Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | GET | `/health` | Health check |
//! | POST | `/api/auth/register` | Create a customer account |
//! | POST | `/api/orders` | Place an order |
//! | POST | `/api/payments/stripe/checkout` | Create a Stripe Checkout Session |
//! | POST | `/api/payments/{provider}/webhook` | Provider webhooks |
//! | GET | `/api/admin/analytics` | Dashboard figures |

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod push;
pub mod routes;
pub mod state;

pub use config::AppConfig;
pub use routes::create_router;
pub use state::AppState;
