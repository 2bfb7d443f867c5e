use atelier_core::order::new_placed_order;
use atelier_core::{Buyer, Money, Order, OrderItem, OrderTotals, PaymentProvider};
use uuid::Uuid;

/// A $480 order for one coat (two units) paid with `provider`
pub(crate) fn sample_order(provider: PaymentProvider) -> Order {
    let buyer = Buyer {
        user_id: Uuid::new_v4(),
        email: "ada@example.com".to_string(),
        name: "Ada Lovelace".to_string(),
    };
    let item = OrderItem {
        id: Uuid::new_v4(),
        product_id: Uuid::new_v4(),
        product_name: "Cashmere Coat".to_string(),
        quantity: 2,
        price: Money::from_cents(24_000),
    };
    let totals = OrderTotals::from_subtotal(item.line_total());
    new_placed_order(&buyer, Uuid::new_v4(), provider, vec![item], totals)
}
