use atelier_core::store::{AddressStore, CartStore, CatalogStore, OrderStore, PaymentStore, UserStore, WishlistStore};
use atelier_core::{
    AddressPatch, Buyer, CartLine, Money, NewAddress, NewProduct, NewUser, Order, OrderLine,
    OrderLookup, OrderRequest, OrderStatus, PaymentOutcome, PaymentProvider, PaymentSignal,
    PaymentStatus, ProductPatch, ReconcileOutcome, Role, ShopError, SignalSource, WishlistToggle,
};
use atelier_core::reconcile::IgnoreReason;
use atelier_store::MemoryStore;
use std::sync::Arc;
use uuid::Uuid;

fn product(style_code: &str, stock: i32) -> NewProduct {
    NewProduct {
        name: format!("Bag {style_code}"),
        style_code: style_code.to_string(),
        description: "Hand-stitched calfskin".to_string(),
        price: Money::from_cents(120_000),
        stock,
        category_id: None,
        materials: vec!["Calfskin".to_string()],
        dimensions: "40 x 30 x 15 cm".to_string(),
        care_instructions: "Store in dust bag".to_string(),
        images: vec!["https://cdn.atelier.shop/bag.jpg".to_string()],
        is_active: true,
        is_featured: false,
    }
}

fn address(name: &str, is_default: bool) -> NewAddress {
    NewAddress {
        full_name: name.to_string(),
        phone: "+1 555 0100".to_string(),
        address_line1: "1 Rue de la Paix".to_string(),
        address_line2: None,
        city: "New York".to_string(),
        state: "NY".to_string(),
        zip_code: "10001".to_string(),
        country: "USA".to_string(),
        is_default,
    }
}

async fn customer(store: &MemoryStore, email: &str) -> Buyer {
    let user = store
        .create_user(NewUser {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            phone: None,
            role: Role::Customer,
        })
        .await
        .unwrap();
    Buyer {
        user_id: user.id,
        email: user.email.clone(),
        name: user.full_name(),
    }
}

async fn place(store: &MemoryStore, buyer: &Buyer, product_id: Uuid, quantity: u32) -> Order {
    let address = store
        .create_address(buyer.user_id, address("Ada", false))
        .await
        .unwrap();
    store
        .place_order(
            buyer,
            &OrderRequest {
                address_id: address.id,
                items: vec![OrderLine {
                    product_id,
                    quantity,
                }],
                payment_method: PaymentProvider::Stripe,
            },
        )
        .await
        .unwrap()
}

fn signal(order: &Order, outcome: PaymentOutcome, source: SignalSource) -> PaymentSignal {
    PaymentSignal::new(PaymentProvider::Stripe, OrderLookup::OrderId(order.id), outcome, source)
}

async fn set_stock(store: &MemoryStore, id: Uuid, stock: i32) {
    let patch = ProductPatch {
        stock: Some(stock),
        ..Default::default()
    };
    store.update_product(id, patch).await.unwrap();
}

async fn stock_of(store: &MemoryStore, id: Uuid) -> i32 {
    store.find_product(id).await.unwrap().unwrap().stock
}

#[tokio::test]
async fn test_double_success_decrements_once() {
    let store = MemoryStore::new();
    let buyer = customer(&store, "ada@example.com").await;
    let bag = store.create_product(product("AT-001", 5)).await.unwrap();
    let order = place(&store, &buyer, bag.id, 2).await;

    let first = store
        .apply_payment(&signal(&order, PaymentOutcome::Succeeded, SignalSource::Redirect))
        .await
        .unwrap();
    let second = store
        .apply_payment(&signal(&order, PaymentOutcome::Succeeded, SignalSource::Webhook))
        .await
        .unwrap();

    assert!(matches!(first, ReconcileOutcome::Confirmed { ref shortfalls, .. } if shortfalls.is_empty()));
    assert!(matches!(second, ReconcileOutcome::Duplicate { .. }));
    assert_eq!(stock_of(&store, bag.id).await, 3);

    let order = store.find_order(order.id).await.unwrap().unwrap();
    assert_eq!(order.status, OrderStatus::Confirmed);
    assert_eq!(order.payment_status, PaymentStatus::Paid);
    let confirmations = order
        .status_history
        .iter()
        .filter(|h| h.status == OrderStatus::Confirmed)
        .count();
    assert_eq!(confirmations, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_confirmations_never_oversell() {
    let store = Arc::new(MemoryStore::new());
    let bag = store.create_product(product("AT-002", 1)).await.unwrap();
    let alice = customer(&store, "alice@example.com").await;
    let bob = customer(&store, "bob@example.com").await;
    let first = place(&store, &alice, bag.id, 1).await;
    let second = place(&store, &bob, bag.id, 1).await;

    let handles: Vec<_> = [first.clone(), second.clone()]
        .into_iter()
        .map(|order| {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                store
                    .apply_payment(&signal(&order, PaymentOutcome::Succeeded, SignalSource::Webhook))
                    .await
                    .unwrap()
            })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(stock_of(&store, bag.id).await, 0);
    let mut flagged = 0;
    for id in [first.id, second.id] {
        let order = store.find_order(id).await.unwrap().unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        if order.needs_review {
            flagged += 1;
        }
    }
    assert_eq!(flagged, 1);
}

#[tokio::test]
async fn test_insufficient_stock_rejects_placement() {
    let store = MemoryStore::new();
    let buyer = customer(&store, "ada@example.com").await;
    let bag = store.create_product(product("AT-003", 1)).await.unwrap();
    let addr = store.create_address(buyer.user_id, address("Ada", false)).await.unwrap();

    let err = store
        .place_order(
            &buyer,
            &OrderRequest {
                address_id: addr.id,
                items: vec![OrderLine {
                    product_id: bag.id,
                    quantity: 2,
                }],
                payment_method: PaymentProvider::Dodo,
            },
        )
        .await
        .unwrap_err();

    assert!(matches!(err, ShopError::InsufficientStock { .. }));
    assert_eq!(stock_of(&store, bag.id).await, 1);
    assert!(store.list_orders_for_user(buyer.user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_product_is_client_error() {
    let store = MemoryStore::new();
    let buyer = customer(&store, "ada@example.com").await;
    let addr = store.create_address(buyer.user_id, address("Ada", false)).await.unwrap();

    let err = store
        .place_order(
            &buyer,
            &OrderRequest {
                address_id: addr.id,
                items: vec![OrderLine {
                    product_id: Uuid::new_v4(),
                    quantity: 1,
                }],
                payment_method: PaymentProvider::Stripe,
            },
        )
        .await
        .unwrap_err();
    assert_eq!(err.status_code(), 400);
}

#[tokio::test]
async fn test_failure_and_cancel_leave_stock() {
    let store = MemoryStore::new();
    let buyer = customer(&store, "ada@example.com").await;
    let bag = store.create_product(product("AT-004", 4)).await.unwrap();
    let failed = place(&store, &buyer, bag.id, 1).await;
    let cancelled = place(&store, &buyer, bag.id, 1).await;

    let outcome = store
        .apply_payment(&signal(&failed, PaymentOutcome::Failed, SignalSource::Webhook))
        .await
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::MarkedFailed { .. }));
    let outcome = store
        .apply_payment(&signal(&cancelled, PaymentOutcome::Cancelled, SignalSource::Redirect))
        .await
        .unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Cancelled { .. }));

    assert_eq!(stock_of(&store, bag.id).await, 4);
    let failed = store.find_order(failed.id).await.unwrap().unwrap();
    assert_eq!(failed.status, OrderStatus::Placed);
    assert_eq!(failed.payment_status, PaymentStatus::Failed);
    let cancelled = store.find_order(cancelled.id).await.unwrap().unwrap();
    assert_eq!(cancelled.status, OrderStatus::Cancelled);

    // a late failure after payment is ignored
    let paid = place(&store, &buyer, bag.id, 1).await;
    store
        .apply_payment(&signal(&paid, PaymentOutcome::Succeeded, SignalSource::Webhook))
        .await
        .unwrap();
    let outcome = store
        .apply_payment(&signal(&paid, PaymentOutcome::Failed, SignalSource::Webhook))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        ReconcileOutcome::Ignored {
            reason: IgnoreReason::AlreadyPaid,
            ..
        }
    ));
}

#[tokio::test]
async fn test_lookup_by_payment_reference() {
    let store = MemoryStore::new();
    let buyer = customer(&store, "ada@example.com").await;
    let bag = store.create_product(product("AT-005", 2)).await.unwrap();
    let order = place(&store, &buyer, bag.id, 1).await;
    store.set_payment_reference(order.id, "cs_test_123").await.unwrap();

    let by_ref = PaymentSignal::new(
        PaymentProvider::Stripe,
        OrderLookup::PaymentReference("cs_test_123".into()),
        PaymentOutcome::Succeeded,
        SignalSource::Webhook,
    )
    .with_transaction(Some("pi_123".into()));
    let outcome = store.apply_payment(&by_ref).await.unwrap();
    assert!(outcome.is_paid());

    let order = store.find_order_by_payment_reference("cs_test_123").await.unwrap().unwrap();
    assert_eq!(order.provider_transaction_id.as_deref(), Some("pi_123"));

    let missing = PaymentSignal::new(
        PaymentProvider::Stripe,
        OrderLookup::PaymentReference("cs_unknown".into()),
        PaymentOutcome::Succeeded,
        SignalSource::Webhook,
    );
    assert_eq!(store.apply_payment(&missing).await.unwrap(), ReconcileOutcome::OrderNotFound);
}

#[tokio::test]
async fn test_earlier_payment_reference_still_resolves() {
    let store = MemoryStore::new();
    let buyer = customer(&store, "ada@example.com").await;
    let bag = store.create_product(product("AT-010", 5)).await.unwrap();
    let order = place(&store, &buyer, bag.id, 1).await;
    store.set_payment_reference(order.id, "order_A").await.unwrap();
    store.set_payment_reference(order.id, "order_B").await.unwrap();

    let latest = store.find_order(order.id).await.unwrap().unwrap();
    assert_eq!(latest.payment_reference.as_deref(), Some("order_B"));
    let by_first = store.find_order_by_payment_reference("order_A").await.unwrap().unwrap();
    assert_eq!(by_first.id, order.id);

    let late_capture = PaymentSignal::new(
        PaymentProvider::Razorpay,
        OrderLookup::PaymentReference("order_A".into()),
        PaymentOutcome::Succeeded,
        SignalSource::Webhook,
    )
    .with_transaction(Some("pay_A".into()));
    let outcome = store.apply_payment(&late_capture).await.unwrap();
    assert!(outcome.is_paid());
    assert_eq!(stock_of(&store, bag.id).await, 4);
}

#[tokio::test]
async fn test_payment_reference_is_unique_across_orders() {
    let store = MemoryStore::new();
    let buyer = customer(&store, "ada@example.com").await;
    let bag = store.create_product(product("AT-011", 5)).await.unwrap();
    let first = place(&store, &buyer, bag.id, 1).await;
    let second = place(&store, &buyer, bag.id, 1).await;

    store.set_payment_reference(first.id, "cs_shared").await.unwrap();
    store.set_payment_reference(first.id, "cs_shared").await.unwrap();
    let err = store.set_payment_reference(second.id, "cs_shared").await.unwrap_err();
    assert!(matches!(err, ShopError::Conflict(_)));

    let found = store.find_order_by_payment_reference("cs_shared").await.unwrap().unwrap();
    assert_eq!(found.id, first.id);
}

#[tokio::test]
async fn test_shortfalls_follow_product_order() {
    let store = MemoryStore::new();
    let buyer = customer(&store, "ada@example.com").await;
    let one = store.create_product(product("AT-012", 1)).await.unwrap();
    let two = store.create_product(product("AT-013", 1)).await.unwrap();
    let (low, high) = if one.id < two.id { (one, two) } else { (two, one) };

    let addr = store.create_address(buyer.user_id, address("Ada", false)).await.unwrap();
    let order = store
        .place_order(
            &buyer,
            &OrderRequest {
                address_id: addr.id,
                items: vec![
                    OrderLine { product_id: high.id, quantity: 1 },
                    OrderLine { product_id: low.id, quantity: 1 },
                ],
                payment_method: PaymentProvider::Stripe,
            },
        )
        .await
        .unwrap();
    // sold elsewhere before the payment lands
    for id in [low.id, high.id] {
        set_stock(&store, id, 0).await;
    }

    let outcome = store
        .apply_payment(&signal(&order, PaymentOutcome::Succeeded, SignalSource::Webhook))
        .await
        .unwrap();
    let ReconcileOutcome::Confirmed { shortfalls, .. } = outcome else {
        panic!("expected confirmation, got {outcome:?}");
    };
    let ids: Vec<Uuid> = shortfalls.iter().map(|s| s.product_id).collect();
    assert_eq!(ids, vec![low.id, high.id]);
}

#[tokio::test]
async fn test_address_default_rules() {
    let store = MemoryStore::new();
    let buyer = customer(&store, "ada@example.com").await;

    let home = store.create_address(buyer.user_id, address("Home", false)).await.unwrap();
    assert!(home.is_default);
    let office = store.create_address(buyer.user_id, address("Office", true)).await.unwrap();
    assert!(office.is_default);

    let listed = store.list_addresses(buyer.user_id).await.unwrap();
    assert_eq!(listed.iter().filter(|a| a.is_default).count(), 1);
    assert_eq!(listed[0].id, office.id);

    let patch = AddressPatch {
        is_default: Some(true),
        ..Default::default()
    };
    store.update_address(buyer.user_id, home.id, patch).await.unwrap();
    let listed = store.list_addresses(buyer.user_id).await.unwrap();
    assert_eq!(listed[0].id, home.id);
    assert!(!listed[1].is_default);

    // deleting the default promotes the remaining address
    store.delete_address(buyer.user_id, home.id).await.unwrap();
    let listed = store.list_addresses(buyer.user_id).await.unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].is_default);

    // other users cannot see or change it
    let stranger = customer(&store, "eve@example.com").await;
    let err = store.set_default_address(stranger.user_id, office.id).await.unwrap_err();
    assert!(matches!(err, ShopError::NotFound { .. }));
}

#[tokio::test]
async fn test_address_in_use_cannot_be_deleted() {
    let store = MemoryStore::new();
    let buyer = customer(&store, "ada@example.com").await;
    let bag = store.create_product(product("AT-006", 2)).await.unwrap();
    let order = place(&store, &buyer, bag.id, 1).await;

    let err = store.delete_address(buyer.user_id, order.address_id).await.unwrap_err();
    assert!(matches!(err, ShopError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_placing_order_clears_cart() {
    let store = MemoryStore::new();
    let buyer = customer(&store, "ada@example.com").await;
    let bag = store.create_product(product("AT-007", 5)).await.unwrap();

    store
        .add_to_cart(buyer.user_id, CartLine { product_id: bag.id, quantity: 2 })
        .await
        .unwrap();
    let line = store
        .add_to_cart(buyer.user_id, CartLine { product_id: bag.id, quantity: 1 })
        .await
        .unwrap();
    assert_eq!(line.quantity, 3);

    place(&store, &buyer, bag.id, 3).await;
    assert!(store.cart_lines(buyer.user_id).await.unwrap().is_empty());
    assert_eq!(stock_of(&store, bag.id).await, 5);
}

#[tokio::test]
async fn test_wishlist_toggle_and_product_delete() {
    let store = MemoryStore::new();
    let buyer = customer(&store, "ada@example.com").await;
    let bag = store.create_product(product("AT-008", 5)).await.unwrap();

    assert_eq!(store.toggle_wishlist(buyer.user_id, bag.id).await.unwrap(), WishlistToggle::Added);
    assert_eq!(store.list_wishlist(buyer.user_id).await.unwrap().len(), 1);
    assert_eq!(store.toggle_wishlist(buyer.user_id, bag.id).await.unwrap(), WishlistToggle::Removed);
    store.toggle_wishlist(buyer.user_id, bag.id).await.unwrap();

    store.delete_product(bag.id).await.unwrap();
    assert!(store.list_wishlist(buyer.user_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_duplicate_style_code_conflicts() {
    let store = MemoryStore::new();
    store.create_product(product("AT-009", 1)).await.unwrap();
    let err = store.create_product(product("AT-009", 1)).await.unwrap_err();
    assert!(matches!(err, ShopError::Conflict(_)));
}
