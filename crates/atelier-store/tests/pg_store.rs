//! PostgreSQL store tests. They need a database and return early when
//! `DATABASE_URL` is not set. Every test creates its own users and products
//! so runs can share one database.

use atelier_core::store::{AddressStore, CatalogStore, OrderStore, PaymentStore, UserStore};
use atelier_core::{
    Buyer, Money, NewAddress, NewProduct, NewUser, Order, OrderLine, OrderLookup, OrderRequest,
    OrderStatus, PaymentOutcome, PaymentProvider, PaymentSignal, PaymentStatus, Product,
    ReconcileOutcome, Role, ShopError, SignalSource,
};
use atelier_store::PgStore;
use uuid::Uuid;

async fn store() -> Option<PgStore> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping PostgreSQL test");
        return None;
    };
    let store = PgStore::connect(&url, 5).await.unwrap();
    store.migrate().await.unwrap();
    Some(store)
}

fn unique(prefix: &str) -> String {
    format!("{prefix}-{}", &Uuid::new_v4().simple().to_string()[..12])
}

async fn product(store: &PgStore, stock: i32) -> Product {
    let style_code = unique("PG");
    store
        .create_product(NewProduct {
            name: format!("Tote {style_code}"),
            style_code,
            description: "Vegetable-tanned leather".to_string(),
            price: Money::from_cents(45_000),
            stock,
            category_id: None,
            materials: vec!["Leather".to_string()],
            dimensions: "35 x 28 x 12 cm".to_string(),
            care_instructions: "Condition twice a year".to_string(),
            images: vec!["https://cdn.atelier.shop/tote.jpg".to_string()],
            is_active: true,
            is_featured: false,
        })
        .await
        .unwrap()
}

/// A customer with one address
async fn customer(store: &PgStore) -> (Buyer, Uuid) {
    let user = store
        .create_user(NewUser {
            email: format!("{}@example.com", unique("ada")),
            password_hash: "hash".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            phone: None,
            role: Role::Customer,
        })
        .await
        .unwrap();
    let address = store
        .create_address(
            user.id,
            NewAddress {
                full_name: "Ada Lovelace".to_string(),
                phone: "+44 20 7946 0000".to_string(),
                address_line1: "12 Savile Row".to_string(),
                address_line2: None,
                city: "London".to_string(),
                state: "LDN".to_string(),
                zip_code: "W1S 3PQ".to_string(),
                country: "UK".to_string(),
                is_default: true,
            },
        )
        .await
        .unwrap();
    let buyer = Buyer {
        user_id: user.id,
        email: user.email.clone(),
        name: user.full_name(),
    };
    (buyer, address.id)
}

fn request(address_id: Uuid, lines: &[(Uuid, u32)]) -> OrderRequest {
    OrderRequest {
        address_id,
        items: lines
            .iter()
            .map(|&(product_id, quantity)| OrderLine { product_id, quantity })
            .collect(),
        payment_method: PaymentProvider::Stripe,
    }
}

async fn place(store: &PgStore, lines: &[(Uuid, u32)]) -> Order {
    let (buyer, address_id) = customer(store).await;
    store.place_order(&buyer, &request(address_id, lines)).await.unwrap()
}

fn paid(order: &Order) -> PaymentSignal {
    PaymentSignal::new(
        PaymentProvider::Stripe,
        OrderLookup::OrderId(order.id),
        PaymentOutcome::Succeeded,
        SignalSource::Webhook,
    )
}

async fn stock_of(store: &PgStore, id: Uuid) -> i32 {
    store.find_product(id).await.unwrap().unwrap().stock
}

#[tokio::test]
async fn test_pg_double_success_decrements_once() {
    let Some(store) = store().await else { return };
    let bag = product(&store, 5).await;
    let order = place(&store, &[(bag.id, 2)]).await;

    let first = store.apply_payment(&paid(&order)).await.unwrap();
    let second = store.apply_payment(&paid(&order)).await.unwrap();

    assert!(matches!(first, ReconcileOutcome::Confirmed { ref shortfalls, .. } if shortfalls.is_empty()));
    assert!(matches!(second, ReconcileOutcome::Duplicate { .. }));
    assert_eq!(stock_of(&store, bag.id).await, 3);

    let order = store.find_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    assert_eq!(order.status_history.len(), 2);
}

#[tokio::test]
async fn test_pg_shortfall_flags_order() {
    let Some(store) = store().await else { return };
    let bag = product(&store, 1).await;
    let first = place(&store, &[(bag.id, 1)]).await;
    let second = place(&store, &[(bag.id, 1)]).await;

    store.apply_payment(&paid(&first)).await.unwrap();
    let outcome = store.apply_payment(&paid(&second)).await.unwrap();

    let ReconcileOutcome::Confirmed { shortfalls, .. } = outcome else {
        panic!("expected confirmation, got {outcome:?}");
    };
    assert_eq!(shortfalls.len(), 1);
    assert_eq!(shortfalls[0].product_id, bag.id);
    assert_eq!(stock_of(&store, bag.id).await, 0);

    let second = store.find_order(second.id).await.unwrap().unwrap();
    assert_eq!(second.payment_status, PaymentStatus::Paid);
    assert!(second.needs_review);
}

#[tokio::test]
async fn test_pg_rejected_placement_leaves_stock() {
    let Some(store) = store().await else { return };
    let bag = product(&store, 1).await;
    let (buyer, address_id) = customer(&store).await;

    let err = store
        .place_order(&buyer, &request(address_id, &[(bag.id, 2)]))
        .await
        .unwrap_err();

    assert!(matches!(err, ShopError::InsufficientStock { .. }));
    assert_eq!(stock_of(&store, bag.id).await, 1);
    assert!(store.list_orders_for_user(buyer.user_id).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pg_crossed_baskets_both_confirm() {
    let Some(store) = store().await else { return };

    for _ in 0..5 {
        let a = product(&store, 10).await;
        let b = product(&store, 10).await;
        let forward = place(&store, &[(a.id, 1), (b.id, 1)]).await;
        let backward = place(&store, &[(b.id, 1), (a.id, 1)]).await;

        let paid_forward = paid(&forward);
        let paid_backward = paid(&backward);
        let (first, second) = tokio::join!(
            store.apply_payment(&paid_forward),
            store.apply_payment(&paid_backward)
        );
        assert!(first.unwrap().is_paid());
        assert!(second.unwrap().is_paid());

        assert_eq!(stock_of(&store, a.id).await, 8);
        assert_eq!(stock_of(&store, b.id).await, 8);
        for id in [forward.id, backward.id] {
            let order = store.find_order(id).await.unwrap().unwrap();
            assert_eq!(order.status, OrderStatus::Confirmed);
            assert!(!order.needs_review);
        }
    }
}

#[tokio::test]
async fn test_pg_every_payment_reference_resolves() {
    let Some(store) = store().await else { return };
    let bag = product(&store, 3).await;
    let order = place(&store, &[(bag.id, 1)]).await;
    let (first_ref, second_ref) = (unique("order"), unique("order"));

    store.set_payment_reference(order.id, &first_ref).await.unwrap();
    store.set_payment_reference(order.id, &second_ref).await.unwrap();
    let found = store.find_order_by_payment_reference(&first_ref).await.unwrap().unwrap();
    assert_eq!(found.id, order.id);
    assert_eq!(found.payment_reference.as_deref(), Some(second_ref.as_str()));

    let late_capture = PaymentSignal::new(
        PaymentProvider::Razorpay,
        OrderLookup::PaymentReference(first_ref.clone()),
        PaymentOutcome::Succeeded,
        SignalSource::Webhook,
    );
    assert!(store.apply_payment(&late_capture).await.unwrap().is_paid());
    assert_eq!(stock_of(&store, bag.id).await, 2);

    let other = place(&store, &[(bag.id, 1)]).await;
    let err = store.set_payment_reference(other.id, &first_ref).await.unwrap_err();
    assert!(matches!(err, ShopError::Conflict(_)));
}
