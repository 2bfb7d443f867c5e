//! # In-Memory Store
//!
//! A `Store` held in process memory behind one async mutex. Every trait
//! method takes the lock once, so each call is atomic in the same way a
//! PostgreSQL transaction is. Used for development without a database and
//! by the test suites.

use async_trait::async_trait;
use atelier_core::address::sort_for_listing;
use atelier_core::analytics::{Overview, RecentOrder, StatusCount, TopProduct, ANALYTICS_LIST_SIZE};
use atelier_core::cart::{check_add, check_sync};
use atelier_core::order::{new_placed_order, placement_rejection, price_items};
use atelier_core::reconcile::{
    apply_cancellation, apply_confirmation, apply_failure, decide, Transition,
};
use atelier_core::store::{
    AddressStore, AnalyticsStore, CartStore, CatalogStore, DeviceStore, OrderStore, PaymentStore,
    Store, UserStore, WishlistStore,
};
use atelier_core::user::normalize_email;
use atelier_core::wishlist::WishlistProduct;
use atelier_core::{
    Address, AddressPatch, Analytics, Buyer, CartLine, Category, Money, NewAddress, NewCategory,
    NewProduct, NewUser, Order, OrderLookup, OrderRef, OrderRequest, OrderStatus, Page,
    PageRequest, PaymentSignal, PaymentStatus, Product, ProductPatch, ProductQuery,
    ProductWithCounts, ReconcileOutcome, ShopError, ShopResult, Shortfall, StatusUpdate, User,
    WishlistEntry, WishlistToggle,
};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct State {
    users: HashMap<Uuid, User>,
    addresses: Vec<Address>,
    categories: Vec<Category>,
    products: Vec<Product>,
    carts: HashMap<Uuid, Vec<CartLine>>,
    orders: Vec<Order>,
    /// Every provider reference issued, to the order it was issued for
    payment_references: HashMap<String, Uuid>,
    wishlist: Vec<WishlistRow>,
    devices: HashMap<String, DeviceRow>,
}

struct WishlistRow {
    user_id: Uuid,
    product_id: Uuid,
    created_at: DateTime<Utc>,
}

struct DeviceRow {
    user_id: Uuid,
    #[allow(dead_code)]
    platform: Option<String>,
}

impl State {
    fn product(&self, id: Uuid) -> ShopResult<&Product> {
        self.products
            .iter()
            .find(|p| p.id == id)
            .ok_or_else(|| ShopError::not_found("Product", id))
    }

    fn products_by_ids(&self, ids: &[Uuid]) -> Vec<Product> {
        self.products
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect()
    }

    fn address_mut(&mut self, user_id: Uuid, id: Uuid) -> ShopResult<&mut Address> {
        self.addresses
            .iter_mut()
            .find(|a| a.id == id && a.user_id == user_id)
            .ok_or_else(|| ShopError::not_found("Address", id))
    }

    fn make_default(&mut self, user_id: Uuid, id: Uuid) {
        for address in self.addresses.iter_mut().filter(|a| a.user_id == user_id) {
            address.is_default = address.id == id;
        }
    }

    fn check_category(&self, category_id: Option<Uuid>) -> ShopResult<()> {
        match category_id {
            Some(id) if !self.categories.iter().any(|c| c.id == id) => {
                Err(ShopError::InvalidRequest(format!("Category not found: {id}")))
            }
            _ => Ok(()),
        }
    }

    fn order_index(&self, lookup: &OrderLookup) -> Option<usize> {
        let id = match lookup {
            OrderLookup::OrderId(id) => *id,
            OrderLookup::PaymentReference(r) => *self.payment_references.get(r)?,
        };
        self.orders.iter().position(|o| o.id == id)
    }
}

fn paginate<T>(items: Vec<T>, request: PageRequest) -> Page<T> {
    let total = items.len() as u64;
    let items = items
        .into_iter()
        .skip(request.offset() as usize)
        .take(request.limit as usize)
        .collect();
    Page {
        items,
        request,
        total,
    }
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> ShopResult<User> {
        let mut state = self.state.lock().await;
        let user = user.into_user();
        if state.users.values().any(|u| u.email == user.email) {
            return Err(ShopError::Conflict("Email already registered".to_string()));
        }
        state.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_user(&self, id: Uuid) -> ShopResult<Option<User>> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> ShopResult<Option<User>> {
        let email = normalize_email(email);
        let state = self.state.lock().await;
        Ok(state.users.values().find(|u| u.email == email).cloned())
    }

    async fn upsert_user(&self, user: NewUser) -> ShopResult<User> {
        let mut state = self.state.lock().await;
        let fresh = user.into_user();
        if let Some(existing) = state.users.values_mut().find(|u| u.email == fresh.email) {
            existing.password_hash = fresh.password_hash;
            existing.first_name = fresh.first_name;
            existing.last_name = fresh.last_name;
            existing.phone = fresh.phone;
            existing.role = fresh.role;
            return Ok(existing.clone());
        }
        state.users.insert(fresh.id, fresh.clone());
        Ok(fresh)
    }
}

#[async_trait]
impl AddressStore for MemoryStore {
    async fn list_addresses(&self, user_id: Uuid) -> ShopResult<Vec<Address>> {
        let state = self.state.lock().await;
        let mut addresses: Vec<Address> = state
            .addresses
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect();
        sort_for_listing(&mut addresses);
        Ok(addresses)
    }

    async fn find_address(&self, user_id: Uuid, id: Uuid) -> ShopResult<Option<Address>> {
        let state = self.state.lock().await;
        Ok(state
            .addresses
            .iter()
            .find(|a| a.id == id && a.user_id == user_id)
            .cloned())
    }

    async fn create_address(&self, user_id: Uuid, address: NewAddress) -> ShopResult<Address> {
        let mut state = self.state.lock().await;
        let first = !state.addresses.iter().any(|a| a.user_id == user_id);
        let wants_default = address.is_default;
        let address = address.into_address(user_id, first || wants_default);
        state.addresses.push(address.clone());
        if address.is_default {
            state.make_default(user_id, address.id);
        }
        Ok(address)
    }

    async fn update_address(&self, user_id: Uuid, id: Uuid, patch: AddressPatch) -> ShopResult<Address> {
        let mut state = self.state.lock().await;
        let make_default = patch.is_default == Some(true);
        state.address_mut(user_id, id)?.apply(patch);
        if make_default {
            state.make_default(user_id, id);
        }
        Ok(state.address_mut(user_id, id)?.clone())
    }

    async fn delete_address(&self, user_id: Uuid, id: Uuid) -> ShopResult<()> {
        let mut state = self.state.lock().await;
        let was_default = state.address_mut(user_id, id)?.is_default;
        if state.orders.iter().any(|o| o.address_id == id) {
            return Err(ShopError::InvalidRequest(
                "Address is used by an order and cannot be deleted".to_string(),
            ));
        }
        state.addresses.retain(|a| a.id != id);

        if was_default {
            let newest = state
                .addresses
                .iter()
                .filter(|a| a.user_id == user_id)
                .max_by_key(|a| a.created_at)
                .map(|a| a.id);
            if let Some(newest) = newest {
                state.make_default(user_id, newest);
            }
        }
        Ok(())
    }

    async fn set_default_address(&self, user_id: Uuid, id: Uuid) -> ShopResult<Address> {
        let mut state = self.state.lock().await;
        state.address_mut(user_id, id)?;
        state.make_default(user_id, id);
        let address = state.address_mut(user_id, id)?;
        address.updated_at = Utc::now();
        Ok(address.clone())
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn list_products(&self, query: ProductQuery) -> ShopResult<Page<Product>> {
        let state = self.state.lock().await;
        let mut products: Vec<Product> = state
            .products
            .iter()
            .filter(|p| p.is_active)
            .filter(|p| query.category_id.map_or(true, |c| p.category_id == Some(c)))
            .filter(|p| !query.featured_only || p.is_featured)
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(products, query.page))
    }

    async fn list_products_with_counts(&self, page: PageRequest) -> ShopResult<Page<ProductWithCounts>> {
        let state = self.state.lock().await;
        let mut rows: Vec<ProductWithCounts> = state
            .products
            .iter()
            .map(|p| ProductWithCounts {
                product: p.clone(),
                order_item_count: state
                    .orders
                    .iter()
                    .flat_map(|o| &o.items)
                    .filter(|i| i.product_id == p.id)
                    .count() as u64,
                wishlist_count: state.wishlist.iter().filter(|w| w.product_id == p.id).count() as u64,
            })
            .collect();
        rows.sort_by(|a, b| b.product.created_at.cmp(&a.product.created_at));
        Ok(paginate(rows, page))
    }

    async fn find_product(&self, id: Uuid) -> ShopResult<Option<Product>> {
        let state = self.state.lock().await;
        Ok(state.products.iter().find(|p| p.id == id).cloned())
    }

    async fn find_products(&self, ids: &[Uuid]) -> ShopResult<Vec<Product>> {
        Ok(self.state.lock().await.products_by_ids(ids))
    }

    async fn create_product(&self, product: NewProduct) -> ShopResult<Product> {
        let mut state = self.state.lock().await;
        if state.products.iter().any(|p| p.style_code == product.style_code) {
            return Err(ShopError::Conflict("Style code already exists".to_string()));
        }
        state.check_category(product.category_id)?;
        let product = product.into_product();
        state.products.push(product.clone());
        Ok(product)
    }

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> ShopResult<Product> {
        let mut state = self.state.lock().await;
        if let Some(code) = &patch.style_code {
            if state.products.iter().any(|p| p.id != id && &p.style_code == code) {
                return Err(ShopError::Conflict("Style code already exists".to_string()));
            }
        }
        state.check_category(patch.category_id)?;
        let product = state
            .products
            .iter_mut()
            .find(|p| p.id == id)
            .ok_or_else(|| ShopError::not_found("Product", id))?;
        product.apply(patch);
        Ok(product.clone())
    }

    async fn delete_product(&self, id: Uuid) -> ShopResult<()> {
        let mut state = self.state.lock().await;
        state.product(id)?;
        if state.orders.iter().flat_map(|o| &o.items).any(|i| i.product_id == id) {
            return Err(ShopError::Conflict(
                "Product is referenced by existing orders".to_string(),
            ));
        }
        state.products.retain(|p| p.id != id);
        for lines in state.carts.values_mut() {
            lines.retain(|l| l.product_id != id);
        }
        state.wishlist.retain(|w| w.product_id != id);
        Ok(())
    }

    async fn list_categories(&self) -> ShopResult<Vec<Category>> {
        let state = self.state.lock().await;
        let mut categories = state.categories.clone();
        categories.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.name.cmp(&b.name)));
        Ok(categories)
    }

    async fn create_category(&self, category: NewCategory) -> ShopResult<Category> {
        let mut state = self.state.lock().await;
        if state.categories.iter().any(|c| c.slug == category.slug) {
            return Err(ShopError::Conflict("Category slug already exists".to_string()));
        }
        let category = category.into_category();
        state.categories.push(category.clone());
        Ok(category)
    }

    async fn upsert_category(&self, category: NewCategory) -> ShopResult<Category> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state.categories.iter_mut().find(|c| c.slug == category.slug) {
            existing.name = category.name;
            existing.description = category.description;
            existing.image_url = category.image_url;
            existing.order = category.order;
            return Ok(existing.clone());
        }
        let category = category.into_category();
        state.categories.push(category.clone());
        Ok(category)
    }
}

#[async_trait]
impl CartStore for MemoryStore {
    async fn cart_lines(&self, user_id: Uuid) -> ShopResult<Vec<CartLine>> {
        let state = self.state.lock().await;
        Ok(state.carts.get(&user_id).cloned().unwrap_or_default())
    }

    async fn add_to_cart(&self, user_id: Uuid, line: CartLine) -> ShopResult<CartLine> {
        let mut state = self.state.lock().await;
        let existing = state
            .carts
            .get(&user_id)
            .and_then(|lines| lines.iter().find(|l| l.product_id == line.product_id))
            .map_or(0, |l| l.quantity);
        let quantity = check_add(state.product(line.product_id)?, existing, line.quantity)?;

        let lines = state.carts.entry(user_id).or_default();
        let updated = CartLine {
            product_id: line.product_id,
            quantity,
        };
        match lines.iter_mut().find(|l| l.product_id == line.product_id) {
            Some(l) => *l = updated,
            None => lines.push(updated),
        }
        Ok(updated)
    }

    async fn replace_cart(&self, user_id: Uuid, lines: Vec<CartLine>) -> ShopResult<Vec<CartLine>> {
        let mut state = self.state.lock().await;
        let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let products = state.products_by_ids(&ids);
        let merged = check_sync(&lines, &products)?;
        state.carts.insert(user_id, merged.clone());
        Ok(merged)
    }

    async fn clear_cart(&self, user_id: Uuid) -> ShopResult<u64> {
        let mut state = self.state.lock().await;
        Ok(state.carts.remove(&user_id).map_or(0, |l| l.len() as u64))
    }
}

#[async_trait]
impl OrderStore for MemoryStore {
    async fn place_order(&self, buyer: &Buyer, request: &OrderRequest) -> ShopResult<Order> {
        let mut state = self.state.lock().await;
        if !state
            .addresses
            .iter()
            .any(|a| a.id == request.address_id && a.user_id == buyer.user_id)
        {
            return Err(ShopError::InvalidRequest("Invalid shipping address".to_string()));
        }

        let lines = request.merged_lines();
        let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
        let products = state.products_by_ids(&ids);
        let (items, totals) = price_items(&lines, &products).map_err(placement_rejection)?;

        let order = new_placed_order(buyer, request.address_id, request.payment_method, items, totals);
        state.orders.push(order.clone());
        state.carts.remove(&buyer.user_id);
        debug!(order_id = %order.id, "Order placed");
        Ok(order)
    }

    async fn find_order(&self, id: Uuid) -> ShopResult<Option<Order>> {
        let state = self.state.lock().await;
        Ok(state.orders.iter().find(|o| o.id == id).cloned())
    }

    async fn find_order_by_payment_reference(&self, reference: &str) -> ShopResult<Option<Order>> {
        let state = self.state.lock().await;
        let lookup = OrderLookup::PaymentReference(reference.to_string());
        Ok(state.order_index(&lookup).map(|index| state.orders[index].clone()))
    }

    async fn list_orders_for_user(&self, user_id: Uuid) -> ShopResult<Vec<Order>> {
        let state = self.state.lock().await;
        let mut orders: Vec<Order> = state
            .orders
            .iter()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn set_payment_reference(&self, order_id: Uuid, reference: &str) -> ShopResult<()> {
        let mut state = self.state.lock().await;
        let State {
            orders,
            payment_references,
            ..
        } = &mut *state;
        let order = orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| ShopError::not_found("Order", order_id))?;
        match payment_references.get(reference) {
            Some(owner) if *owner != order_id => {
                return Err(ShopError::Conflict(format!(
                    "Payment reference {reference} belongs to another order"
                )));
            }
            Some(_) => {}
            None => {
                payment_references.insert(reference.to_string(), order_id);
            }
        }
        order.payment_reference = Some(reference.to_string());
        order.updated_at = Utc::now();
        Ok(())
    }

    async fn update_order_status(&self, id: Uuid, update: &StatusUpdate) -> ShopResult<Order> {
        let mut state = self.state.lock().await;
        let order = state
            .orders
            .iter_mut()
            .find(|o| o.id == id)
            .ok_or_else(|| ShopError::not_found("Order", id))?;
        order.apply_status_update(update);
        Ok(order.clone())
    }
}

#[async_trait]
impl PaymentStore for MemoryStore {
    async fn apply_payment(&self, signal: &PaymentSignal) -> ShopResult<ReconcileOutcome> {
        let mut state = self.state.lock().await;
        let Some(index) = state.order_index(&signal.lookup) else {
            return Ok(ReconcileOutcome::OrderNotFound);
        };
        let State {
            orders, products, ..
        } = &mut *state;
        let order = &mut orders[index];
        let order_ref = OrderRef::from(&*order);

        let outcome = match decide(order.status, order.payment_status, signal.outcome) {
            Transition::Confirm => {
                let mut shortfalls = Vec::new();
                for item in order.lines_by_product() {
                    let wanted = i32::try_from(item.quantity).unwrap_or(i32::MAX);
                    match products
                        .iter_mut()
                        .find(|p| p.id == item.product_id && p.stock >= wanted)
                    {
                        Some(product) => {
                            product.stock -= wanted;
                            product.updated_at = Utc::now();
                        }
                        None => shortfalls.push(Shortfall {
                            product_id: item.product_id,
                            product_name: item.product_name.clone(),
                            quantity: item.quantity,
                        }),
                    }
                }
                apply_confirmation(order, signal, &shortfalls);
                ReconcileOutcome::Confirmed {
                    order: order_ref,
                    shortfalls,
                }
            }
            Transition::MarkFailed => {
                apply_failure(order, signal);
                ReconcileOutcome::MarkedFailed { order: order_ref }
            }
            Transition::Cancel => {
                apply_cancellation(order, signal);
                ReconcileOutcome::Cancelled { order: order_ref }
            }
            Transition::Duplicate => ReconcileOutcome::Duplicate { order: order_ref },
            Transition::Ignore(reason) => ReconcileOutcome::Ignored {
                order: order_ref,
                reason,
            },
        };
        Ok(outcome)
    }
}

#[async_trait]
impl WishlistStore for MemoryStore {
    async fn list_wishlist(&self, user_id: Uuid) -> ShopResult<Vec<WishlistEntry>> {
        let state = self.state.lock().await;
        let mut entries: Vec<WishlistEntry> = state
            .wishlist
            .iter()
            .filter(|w| w.user_id == user_id)
            .filter_map(|w| {
                let product = state.products.iter().find(|p| p.id == w.product_id)?;
                Some(WishlistEntry {
                    product_id: w.product_id,
                    product: WishlistProduct::from(product),
                    created_at: w.created_at,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn toggle_wishlist(&self, user_id: Uuid, product_id: Uuid) -> ShopResult<WishlistToggle> {
        let mut state = self.state.lock().await;
        state.product(product_id)?;
        let before = state.wishlist.len();
        state
            .wishlist
            .retain(|w| !(w.user_id == user_id && w.product_id == product_id));
        if state.wishlist.len() < before {
            return Ok(WishlistToggle::Removed);
        }
        state.wishlist.push(WishlistRow {
            user_id,
            product_id,
            created_at: Utc::now(),
        });
        Ok(WishlistToggle::Added)
    }
}

#[async_trait]
impl DeviceStore for MemoryStore {
    async fn register_device(&self, user_id: Uuid, token: &str, platform: Option<&str>) -> ShopResult<()> {
        let mut state = self.state.lock().await;
        state.devices.insert(
            token.to_string(),
            DeviceRow {
                user_id,
                platform: platform.map(String::from),
            },
        );
        Ok(())
    }

    async fn device_tokens(&self, user_id: Uuid) -> ShopResult<Vec<String>> {
        let state = self.state.lock().await;
        let mut tokens: Vec<String> = state
            .devices
            .iter()
            .filter(|(_, d)| d.user_id == user_id)
            .map(|(t, _)| t.clone())
            .collect();
        tokens.sort();
        Ok(tokens)
    }

    async fn remove_device_tokens(&self, tokens: &[String]) -> ShopResult<u64> {
        let mut state = self.state.lock().await;
        let before = state.devices.len();
        state.devices.retain(|t, _| !tokens.contains(t));
        Ok((before - state.devices.len()) as u64)
    }
}

#[async_trait]
impl AnalyticsStore for MemoryStore {
    async fn analytics(&self) -> ShopResult<Analytics> {
        let state = self.state.lock().await;

        let total_revenue: Money = state
            .orders
            .iter()
            .filter(|o| o.payment_status == PaymentStatus::Paid)
            .map(|o| o.total)
            .sum();
        let overview = Overview {
            total_orders: state.orders.len() as u64,
            total_revenue,
            total_customers: state
                .users
                .values()
                .filter(|u| !u.is_admin())
                .count() as u64,
        };

        let mut recent: Vec<&Order> = state.orders.iter().collect();
        recent.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let recent_orders = recent
            .into_iter()
            .take(ANALYTICS_LIST_SIZE)
            .map(|o| RecentOrder {
                id: o.id,
                order_number: o.order_number.clone(),
                user_name: o.user_name.clone(),
                total: o.total,
                status: o.status,
                payment_status: o.payment_status,
                created_at: o.created_at,
            })
            .collect();

        // product id -> (units, orders)
        let mut sold: HashMap<Uuid, (u64, u64, String)> = HashMap::new();
        for order in &state.orders {
            for item in &order.items {
                let entry = sold
                    .entry(item.product_id)
                    .or_insert_with(|| (0, 0, item.product_name.clone()));
                entry.0 += u64::from(item.quantity);
                entry.1 += 1;
            }
        }
        let mut top: Vec<TopProduct> = sold
            .into_iter()
            .map(|(product_id, (total_sold, order_count, frozen_name))| {
                let current = state.products.iter().find(|p| p.id == product_id);
                TopProduct {
                    product_id,
                    name: current.map_or(frozen_name, |p| p.name.clone()),
                    deleted: current.is_none(),
                    total_sold,
                    order_count,
                }
            })
            .collect();
        top.sort_by(|a, b| b.total_sold.cmp(&a.total_sold).then_with(|| a.name.cmp(&b.name)));
        top.truncate(ANALYTICS_LIST_SIZE);

        let mut orders_by_status: Vec<StatusCount> = OrderStatus::ALL
            .into_iter()
            .filter_map(|status| {
                let count = state.orders.iter().filter(|o| o.status == status).count() as u64;
                (count > 0).then_some(StatusCount { status, count })
            })
            .collect();
        // Same order as the SQL `ORDER BY status`
        orders_by_status.sort_by_key(|c| c.status.as_str());

        Ok(Analytics {
            overview,
            recent_orders,
            top_products: top,
            orders_by_status,
        })
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> ShopResult<()> {
        Ok(())
    }
}
