//! # Routes
//!
//! Axum router for the storefront API.
//!
//! Routes:
//! - `/health`
//! - `/api/auth/*`, `/api/addresses/*`, `/api/products/*`, `/api/cart`,
//!   `/api/orders/*`, `/api/wishlist`, `/api/notifications/*`
//! - `/api/payments/{stripe,razorpay,dodo}/*` (checkout, intent, return, webhook)
//! - `/api/admin/*`, `/api/upload`
//! - `/uploads/*` static files

use crate::handlers::{self, addresses, admin, auth, cart, notifications, orders, payments, products, upload, wishlist};
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, patch, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/verify", get(auth::verify))
}

fn address_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(addresses::list_addresses).post(addresses::create_address))
        .route(
            "/{id}",
            get(addresses::get_address)
                .patch(addresses::update_address)
                .delete(addresses::delete_address),
        )
        .route("/{id}/default", patch(addresses::set_default_address))
}

fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(products::list_products).post(products::create_product))
        // Static segment wins over `{id}`
        .route("/categories", get(products::list_categories).post(products::create_category))
        .route(
            "/{id}",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
}

fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::list_orders).post(orders::create_order))
        .route("/{id}", get(orders::get_order))
        .route("/{id}/status", put(orders::update_order_status))
}

fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/stripe/checkout", post(payments::stripe_checkout))
        .route("/stripe/intent", post(payments::stripe_intent))
        .route("/stripe/return", get(payments::stripe_return))
        .route("/stripe/cancel", get(payments::stripe_cancel))
        .route("/stripe/webhook", post(payments::stripe_webhook))
        .route("/razorpay/order", post(payments::razorpay_order))
        .route("/razorpay/verify", post(payments::razorpay_verify))
        .route("/razorpay/webhook", post(payments::razorpay_webhook))
        .route("/dodo/create-checkout", post(payments::dodo_checkout))
        .route("/dodo/return", get(payments::dodo_return))
        .route("/dodo/webhook", post(payments::dodo_webhook))
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(admin::list_products))
        .route("/analytics", get(admin::analytics))
}

/// Routes under `/api`
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_routes())
        .nest("/addresses", address_routes())
        .nest("/products", product_routes())
        .route(
            "/cart",
            get(cart::get_cart)
                .post(cart::add_to_cart)
                .put(cart::sync_cart)
                .delete(cart::clear_cart),
        )
        .nest("/orders", order_routes())
        .route("/wishlist", get(wishlist::list_wishlist).post(wishlist::toggle_wishlist))
        .route("/notifications/register", post(notifications::register_device))
        .route("/notifications/send", post(notifications::send_notification))
        .nest("/payments", payment_routes())
        .nest("/admin", admin_routes())
        .route(
            "/upload",
            post(upload::upload_images).layer(DefaultBodyLimit::max(upload::MAX_UPLOAD_BODY)),
        )
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let uploads = ServeDir::new(&state.config.upload_dir);

    Router::new()
        .route("/health", get(handlers::health))
        .route("/", get(handlers::health))
        .nest("/api", api_routes())
        .nest_service("/uploads", uploads)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
