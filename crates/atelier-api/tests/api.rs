mod common;

use atelier_core::store::{CartStore, DeviceStore};
use axum::http::StatusCode;
use common::*;
use serde_json::{json, Value};

#[tokio::test]
async fn test_register_login_and_verify() {
    let app = app();
    let (token, user_id) = register(&app, "Ada@Example.com").await;

    let duplicate = app
        .server
        .post("/api/auth/register")
        .json(&json!({
            "email": "ada@example.com",
            "password": "secret123",
            "firstName": "Ada",
            "lastName": "Byron"
        }))
        .await;
    duplicate.assert_status(StatusCode::BAD_REQUEST);

    let wrong = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "ada@example.com", "password": "nope-nope" }))
        .await;
    wrong.assert_status(StatusCode::UNAUTHORIZED);

    let login = app
        .server
        .post("/api/auth/login")
        .json(&json!({ "email": "ada@example.com", "password": "secret123" }))
        .await;
    login.assert_status_ok();
    let body: Value = login.json();
    assert_eq!(body["user"]["role"], "CUSTOMER");
    assert!(body["user"].get("passwordHash").is_none());

    let (name, value) = bearer(&token);
    let verify = app.server.get("/api/auth/verify").add_header(name, value).await;
    verify.assert_status_ok();
    let claims: Value = verify.json();
    assert_eq!(claims["payload"]["sub"], user_id.to_string());
    assert_eq!(claims["payload"]["email"], "ada@example.com");

    let refresh = app
        .server
        .post("/api/auth/refresh")
        .json(&json!({ "refreshToken": body["refreshToken"] }))
        .await;
    refresh.assert_status_ok();
    assert!(refresh.json::<Value>()["accessToken"].is_string());
}

#[tokio::test]
async fn test_register_validates_input() {
    let app = app();
    let response = app
        .server
        .post("/api/auth/register")
        .json(&json!({
            "email": "not-an-email",
            "password": "123",
            "firstName": "Ada",
            "lastName": "Lovelace"
        }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["error"], "Validation failed");
    assert!(body["details"]["password"].is_array());
}

#[tokio::test]
async fn test_refresh_token_is_not_an_access_token() {
    let app = app();
    let login_body = {
        register(&app, "ada@example.com").await;
        app.server
            .post("/api/auth/login")
            .json(&json!({ "email": "ada@example.com", "password": "secret123" }))
            .await
            .json::<Value>()
    };
    let (name, value) = bearer(login_body["refreshToken"].as_str().unwrap());
    app.server
        .get("/api/auth/verify")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let app = app();
    app.server
        .get("/api/admin/analytics")
        .await
        .assert_status(StatusCode::UNAUTHORIZED);

    let (customer, _) = register(&app, "ada@example.com").await;
    let (name, value) = bearer(&customer);
    app.server
        .get("/api/admin/analytics")
        .add_header(name, value)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let admin = admin_token(&app).await;
    let (name, value) = bearer(&admin);
    let response = app.server.get("/api/admin/analytics").add_header(name, value).await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["overview"]["totalCustomers"], 1);
    assert_eq!(body["overview"]["totalOrders"], 0);
}

#[tokio::test]
async fn test_order_totals_and_cart_cleared() {
    let app = app();
    let (token, user_id) = register(&app, "ada@example.com").await;
    let address_id = address(&app, &token).await;
    let bag = product(&app, "BAG-1", 24_000, 5).await;

    let (name, value) = bearer(&token);
    app.server
        .post("/api/cart")
        .add_header(name, value)
        .json(&json!({ "productId": bag.id, "quantity": 2 }))
        .await
        .assert_status_ok();

    let order = place_order(&app, &token, address_id, &[(bag.id, 1), (bag.id, 1)], "stripe").await;

    assert_eq!(order["subtotal"].as_f64(), Some(480.0));
    assert_eq!(order["shippingCost"].as_f64(), Some(25.0));
    assert_eq!(order["tax"].as_f64(), Some(38.4));
    assert_eq!(order["total"].as_f64(), Some(543.4));
    assert_eq!(order["status"], "PLACED");
    assert_eq!(order["paymentStatus"], "PENDING");
    assert_eq!(order["items"].as_array().unwrap().len(), 1);
    assert_eq!(order["items"][0]["quantity"], 2);
    assert_eq!(order["statusHistory"][0]["notes"], "Order placed successfully");

    // Stock moves only on payment
    assert_eq!(stock_of(&app, bag.id).await, 5);
    assert!(app.store.cart_lines(user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_insufficient_stock_rejects_order() {
    let app = app();
    let (token, _) = register(&app, "ada@example.com").await;
    let address_id = address(&app, &token).await;
    let bag = product(&app, "BAG-1", 24_000, 1).await;
    let wallet = product(&app, "WAL-1", 9_000, 10).await;

    let (name, value) = bearer(&token);
    let response = app
        .server
        .post("/api/orders")
        .add_header(name, value)
        .json(&json!({
            "addressId": address_id,
            "items": [
                { "productId": wallet.id, "quantity": 1 },
                { "productId": bag.id, "quantity": 2 }
            ],
            "paymentMethod": "stripe"
        }))
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(stock_of(&app, bag.id).await, 1);
    assert_eq!(stock_of(&app, wallet.id).await, 10);
}

#[tokio::test]
async fn test_orders_are_private() {
    let app = app();
    let (owner, _) = register(&app, "ada@example.com").await;
    let (other, _) = register(&app, "grace@example.com").await;
    let address_id = address(&app, &owner).await;
    let bag = product(&app, "BAG-1", 24_000, 3).await;
    let order = place_order(&app, &owner, address_id, &[(bag.id, 1)], "stripe").await;
    let path = format!("/api/orders/{}", order["id"].as_str().unwrap());

    let (name, value) = bearer(&other);
    app.server
        .get(&path)
        .add_header(name, value)
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let (name, value) = bearer(&owner);
    app.server.get(&path).add_header(name, value).await.assert_status_ok();

    let (name, value) = bearer(&other);
    let listed = app.server.get("/api/orders").add_header(name, value).await;
    assert!(listed.json::<Value>()["orders"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_admin_status_update_appends_history() {
    let app = app();
    let admin = admin_token(&app).await;
    let (token, _) = register(&app, "ada@example.com").await;
    let address_id = address(&app, &token).await;
    let bag = product(&app, "BAG-1", 24_000, 3).await;
    let order = place_order(&app, &token, address_id, &[(bag.id, 1)], "stripe").await;
    let path = format!("/api/orders/{}/status", order["id"].as_str().unwrap());

    let (name, value) = bearer(&token);
    app.server
        .put(&path)
        .add_header(name, value)
        .json(&json!({ "status": "SHIPPED" }))
        .await
        .assert_status(StatusCode::FORBIDDEN);

    let (name, value) = bearer(&admin);
    let response = app
        .server
        .put(&path)
        .add_header(name, value)
        .json(&json!({ "status": "SHIPPED", "trackingNumber": "1Z999", "carrier": "UPS" }))
        .await;
    response.assert_status_ok();
    let updated: Value = response.json();
    assert_eq!(updated["order"]["status"], "SHIPPED");
    assert_eq!(updated["order"]["trackingNumber"], "1Z999");
    assert_eq!(updated["order"]["statusHistory"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_product_listing_pagination() {
    let app = app();
    for i in 0..3 {
        product(&app, &format!("BAG-{i}"), 10_000, 1).await;
    }

    let response = app.server.get("/api/products?page=2&limit=2").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["products"].as_array().unwrap().len(), 1);
    assert_eq!(
        body["pagination"],
        json!({ "page": 2, "limit": 2, "total": 3, "totalPages": 2 })
    );
}

#[tokio::test]
async fn test_admin_product_crud() {
    let app = app();
    let admin = admin_token(&app).await;

    let invalid = {
        let (name, value) = bearer(&admin);
        app.server
            .post("/api/products")
            .add_header(name, value)
            .json(&json!({
                "name": "Aurelia Tote",
                "styleCode": "AUR-1",
                "description": "Tote",
                "price": 0,
                "materials": ["leather"],
                "dimensions": "40 cm",
                "careInstructions": "Wipe",
                "images": ["https://cdn.atelier.shop/a.jpg"]
            }))
            .await
    };
    invalid.assert_status(StatusCode::BAD_REQUEST);

    let (name, value) = bearer(&admin);
    let created = app
        .server
        .post("/api/products")
        .add_header(name, value)
        .json(&json!({
            "name": "Aurelia Tote",
            "styleCode": "AUR-1",
            "description": "Tote",
            "price": 1250.5,
            "stock": 4,
            "materials": ["leather"],
            "dimensions": "40 cm",
            "careInstructions": "Wipe",
            "images": ["https://cdn.atelier.shop/a.jpg"]
        }))
        .await;
    created.assert_status(StatusCode::CREATED);
    let id = created.json::<Value>()["product"]["id"].as_str().unwrap().to_string();

    let (name, value) = bearer(&admin);
    let updated = app
        .server
        .put(&format!("/api/products/{id}"))
        .add_header(name, value)
        .json(&json!({ "stock": 9 }))
        .await;
    updated.assert_status_ok();
    let product: Value = updated.json();
    assert_eq!(product["product"]["stock"], 9);
    assert_eq!(product["product"]["price"].as_f64(), Some(1250.5));

    let (name, value) = bearer(&admin);
    let listed = app.server.get("/api/admin/products").add_header(name, value).await;
    let body: Value = listed.json();
    assert_eq!(body["pagination"]["limit"], 50);
    assert_eq!(body["products"][0]["orderItemCount"], 0);

    let (name, value) = bearer(&admin);
    app.server
        .delete(&format!("/api/products/{id}"))
        .add_header(name, value)
        .await
        .assert_status_ok();
    app.server
        .get(&format!("/api/products/{id}"))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_address_flow() {
    let app = app();
    let (token, _) = register(&app, "ada@example.com").await;
    let first = address(&app, &token).await;
    let second = address(&app, &token).await;

    let (name, value) = bearer(&token);
    let listed = app.server.get("/api/addresses").add_header(name, value).await;
    let body: Value = listed.json();
    assert_eq!(body["addresses"][0]["id"], first.to_string());
    assert_eq!(body["addresses"][0]["isDefault"], true);

    let (name, value) = bearer(&token);
    let made_default = app
        .server
        .patch(&format!("/api/addresses/{second}/default"))
        .add_header(name, value)
        .await;
    made_default.assert_status_ok();
    assert_eq!(made_default.json::<Value>()["address"]["isDefault"], true);

    let (other, _) = register(&app, "grace@example.com").await;
    let (name, value) = bearer(&other);
    app.server
        .get(&format!("/api/addresses/{second}"))
        .add_header(name, value)
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_wishlist_toggle() {
    let app = app();
    let (token, _) = register(&app, "ada@example.com").await;
    let bag = product(&app, "BAG-1", 24_000, 3).await;

    let (name, value) = bearer(&token);
    let added = app
        .server
        .post("/api/wishlist")
        .add_header(name, value)
        .json(&json!({ "productId": bag.id }))
        .await;
    assert_eq!(added.json::<Value>()["message"], "Added to wishlist");

    let (name, value) = bearer(&token);
    let listed = app.server.get("/api/wishlist").add_header(name, value).await;
    let body: Value = listed.json();
    assert_eq!(body["wishlistItems"][0]["product"]["styleCode"], "BAG-1");

    let (name, value) = bearer(&token);
    let removed = app
        .server
        .post("/api/wishlist")
        .add_header(name, value)
        .json(&json!({ "productId": bag.id }))
        .await;
    assert_eq!(removed.json::<Value>()["inWishlist"], false);
}

#[tokio::test]
async fn test_device_registration_always_succeeds() {
    let app = app();
    let anonymous = app
        .server
        .post("/api/notifications/register")
        .json(&json!({ "token": "fcm-1" }))
        .await;
    anonymous.assert_status_ok();
    assert_eq!(anonymous.json::<Value>()["success"], true);

    let (token, user_id) = register(&app, "ada@example.com").await;
    let (name, value) = bearer(&token);
    app.server
        .post("/api/notifications/register")
        .add_header(name, value)
        .json(&json!({ "token": "fcm-1", "platform": "ios" }))
        .await
        .assert_status_ok();
    assert_eq!(app.store.device_tokens(user_id).await.unwrap(), vec!["fcm-1".to_string()]);

    let admin = admin_token(&app).await;
    let (name, value) = bearer(&admin);
    app.server
        .post("/api/notifications/send")
        .add_header(name, value)
        .json(&json!({ "title": "Sale", "body": "Up to 30% off", "broadcast": true }))
        .await
        .assert_status(StatusCode::NOT_IMPLEMENTED);

    let (name, value) = bearer(&admin);
    let sent = app
        .server
        .post("/api/notifications/send")
        .add_header(name, value)
        .json(&json!({ "userId": user_id, "title": "Hello", "body": "Welcome" }))
        .await;
    sent.assert_status_ok();
    assert_eq!(sent.json::<Value>()["message"], "Notification sent successfully");
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let response = app.server.get("/health").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["storage"]["backend"], "memory");
}
