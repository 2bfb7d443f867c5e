#![allow(dead_code)]

use atelier_api::auth::hash_password;
use atelier_api::push::LoggingNotifier;
use atelier_api::{create_router, AppConfig, AppState};
use atelier_core::store::{CatalogStore, UserStore};
use atelier_core::{BoxedPushNotifier, Money, NewProduct, NewUser, PaymentStrategySelector, Product, Role};
use atelier_pay::{RazorpayConfig, RazorpayStrategy, StripeCheckoutStrategy, StripeConfig};
use atelier_store::MemoryStore;
use axum::http::{header::AUTHORIZATION, HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use serde_json::{json, Value};
use std::sync::Arc;
use uuid::Uuid;

pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_test_secret";
pub const RAZORPAY_KEY_SECRET: &str = "rzp_secret";
pub const RAZORPAY_WEBHOOK_SECRET: &str = "rzp_webhook_secret";

pub struct TestApp {
    pub server: TestServer,
    pub store: Arc<MemoryStore>,
}

pub fn app() -> TestApp {
    app_with(PaymentStrategySelector::new())
}

pub fn app_with(strategies: PaymentStrategySelector) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let notifier: BoxedPushNotifier = Arc::new(LoggingNotifier::new(store.clone()));
    let state = AppState::build(AppConfig::for_tests(), store.clone(), strategies, notifier);
    let server = TestServer::new(create_router(state)).unwrap();
    TestApp { server, store }
}

/// Stripe and Razorpay pointed at `api_base`
pub fn providers(api_base: &str) -> PaymentStrategySelector {
    let stripe = StripeConfig::new("sk_test_123", STRIPE_WEBHOOK_SECRET).with_api_base_url(api_base);
    let razorpay =
        RazorpayConfig::new("rzp_test_key", RAZORPAY_KEY_SECRET, RAZORPAY_WEBHOOK_SECRET).with_api_base_url(api_base);
    PaymentStrategySelector::new()
        .with_strategy(Arc::new(StripeCheckoutStrategy::new(stripe).unwrap()))
        .with_strategy(Arc::new(RazorpayStrategy::new(razorpay).unwrap()))
}

pub fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}")).unwrap())
}

/// Register a customer, returning (access token, user id)
pub async fn register(app: &TestApp, email: &str) -> (String, Uuid) {
    let response = app
        .server
        .post("/api/auth/register")
        .json(&json!({
            "email": email,
            "password": "secret123",
            "firstName": "Ada",
            "lastName": "Lovelace"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    (
        body["accessToken"].as_str().unwrap().to_string(),
        body["user"]["id"].as_str().unwrap().parse().unwrap(),
    )
}

pub async fn admin_token(app: &TestApp) -> String {
    app.store
        .create_user(NewUser {
            email: "admin@atelier.shop".into(),
            password_hash: hash_password("admin-pass".into(), 4).await.unwrap(),
            first_name: "Site".into(),
            last_name: "Admin".into(),
            phone: None,
            role: Role::Admin,
        })
        .await
        .unwrap();

    let response = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "admin@atelier.shop", "password": "admin-pass" }))
        .await;
    response.assert_status_ok();
    response.json::<Value>()["accessToken"].as_str().unwrap().to_string()
}

pub async fn product(app: &TestApp, style_code: &str, price_cents: i64, stock: i32) -> Product {
    app.store
        .create_product(NewProduct {
            name: format!("Piece {style_code}"),
            style_code: style_code.into(),
            description: "Full-grain leather".into(),
            price: Money::from_cents(price_cents),
            stock,
            category_id: None,
            materials: vec!["leather".into()],
            dimensions: "30 x 20 x 10 cm".into(),
            care_instructions: "Wipe clean".into(),
            images: vec!["https://cdn.atelier.shop/a.jpg".into()],
            is_active: true,
            is_featured: false,
        })
        .await
        .unwrap()
}

pub async fn address(app: &TestApp, token: &str) -> Uuid {
    let (name, value) = bearer(token);
    let response = app
        .server
        .post("/api/addresses")
        .add_header(name, value)
        .json(&json!({
            "fullName": "Ada Lovelace",
            "phone": "+1 555 0100",
            "addressLine1": "1 Analytical Way",
            "city": "London",
            "state": "LDN",
            "zipCode": "N1 9GU"
        }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["address"]["id"].as_str().unwrap().parse().unwrap()
}

/// Place an order and return its JSON
pub async fn place_order(app: &TestApp, token: &str, address_id: Uuid, lines: &[(Uuid, u32)], method: &str) -> Value {
    let (name, value) = bearer(token);
    let items: Vec<Value> = lines
        .iter()
        .map(|(id, qty)| json!({ "productId": id, "quantity": qty }))
        .collect();
    let response = app
        .server
        .post("/api/orders")
        .add_header(name, value)
        .json(&json!({ "addressId": address_id, "items": items, "paymentMethod": method }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json::<Value>()["order"].clone()
}

pub async fn stock_of(app: &TestApp, id: Uuid) -> i32 {
    app.store.find_product(id).await.unwrap().unwrap().stock
}
