//! Row structs and their conversion into domain types.

use atelier_core::{
    Address, Category, Money, Order, OrderItem, Product, ShopError, ShopResult,
    StatusHistoryEntry, User,
};
use chrono::{DateTime, Utc};
use std::str::FromStr;
use uuid::Uuid;

pub(crate) const USER_COLUMNS: &str =
    "id, email, password_hash, first_name, last_name, phone, role, created_at";

pub(crate) const ADDRESS_COLUMNS: &str = "id, user_id, full_name, phone, address_line1, address_line2, \
     city, state, zip_code, country, is_default, created_at, updated_at";

pub(crate) const CATEGORY_COLUMNS: &str =
    "id, name, slug, description, image_url, display_order, created_at";

pub(crate) const PRODUCT_COLUMNS: &str = "id, name, style_code, description, price_cents, stock, \
     category_id, materials, dimensions, care_instructions, images, is_active, is_featured, \
     created_at, updated_at";

pub(crate) const ORDER_COLUMNS: &str = "id, order_number, user_id, user_email, user_name, address_id, \
     subtotal_cents, shipping_cents, tax_cents, total_cents, status, payment_status, payment_method, \
     payment_reference, provider_transaction_id, needs_review, tracking_number, carrier, \
     created_at, updated_at";

fn parse_column<T: FromStr<Err = String>>(column: &str, value: &str) -> ShopResult<T> {
    value
        .parse()
        .map_err(|e| ShopError::Storage(format!("bad {column} value {value:?}: {e}")))
}

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    id: Uuid,
    email: String,
    password_hash: String,
    first_name: String,
    last_name: String,
    phone: Option<String>,
    role: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = ShopError;

    fn try_from(row: UserRow) -> ShopResult<Self> {
        Ok(User {
            role: parse_column("role", &row.role)?,
            id: row.id,
            email: row.email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: row.phone,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct AddressRow {
    id: Uuid,
    user_id: Uuid,
    full_name: String,
    phone: String,
    address_line1: String,
    address_line2: Option<String>,
    city: String,
    state: String,
    zip_code: String,
    country: String,
    is_default: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AddressRow> for Address {
    fn from(row: AddressRow) -> Self {
        Address {
            id: row.id,
            user_id: row.user_id,
            full_name: row.full_name,
            phone: row.phone,
            address_line1: row.address_line1,
            address_line2: row.address_line2,
            city: row.city,
            state: row.state,
            zip_code: row.zip_code,
            country: row.country,
            is_default: row.is_default,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct CategoryRow {
    id: Uuid,
    name: String,
    slug: String,
    description: Option<String>,
    image_url: Option<String>,
    display_order: i32,
    created_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Category {
            id: row.id,
            name: row.name,
            slug: row.slug,
            description: row.description,
            image_url: row.image_url,
            order: row.display_order,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct ProductRow {
    id: Uuid,
    name: String,
    style_code: String,
    description: String,
    price_cents: i64,
    stock: i32,
    category_id: Option<Uuid>,
    materials: Vec<String>,
    dimensions: String,
    care_instructions: String,
    images: Vec<String>,
    is_active: bool,
    is_featured: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ProductRow> for Product {
    fn from(row: ProductRow) -> Self {
        Product {
            id: row.id,
            name: row.name,
            style_code: row.style_code,
            description: row.description,
            price: Money::from_cents(row.price_cents),
            stock: row.stock,
            category_id: row.category_id,
            materials: row.materials,
            dimensions: row.dimensions,
            care_instructions: row.care_instructions,
            images: row.images,
            is_active: row.is_active,
            is_featured: row.is_featured,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Product row plus the admin listing counters
#[derive(sqlx::FromRow)]
pub(crate) struct ProductCountsRow {
    #[sqlx(flatten)]
    pub product: ProductRow,
    pub order_item_count: i64,
    pub wishlist_count: i64,
}

#[derive(sqlx::FromRow)]
pub(crate) struct OrderRow {
    pub id: Uuid,
    order_number: String,
    user_id: Uuid,
    user_email: String,
    user_name: String,
    address_id: Uuid,
    subtotal_cents: i64,
    shipping_cents: i64,
    tax_cents: i64,
    total_cents: i64,
    status: String,
    payment_status: String,
    payment_method: String,
    payment_reference: Option<String>,
    provider_transaction_id: Option<String>,
    needs_review: bool,
    tracking_number: Option<String>,
    carrier: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    /// Assemble an order with its items and history
    pub fn into_order(
        self,
        items: Vec<OrderItemRow>,
        history: Vec<HistoryRow>,
    ) -> ShopResult<Order> {
        let status_history = history
            .into_iter()
            .map(StatusHistoryEntry::try_from)
            .collect::<ShopResult<Vec<_>>>()?;

        Ok(Order {
            status: parse_column("status", &self.status)?,
            payment_status: parse_column("payment_status", &self.payment_status)?,
            payment_method: parse_column("payment_method", &self.payment_method)?,
            id: self.id,
            order_number: self.order_number,
            user_id: self.user_id,
            user_email: self.user_email,
            user_name: self.user_name,
            address_id: self.address_id,
            subtotal: Money::from_cents(self.subtotal_cents),
            shipping_cost: Money::from_cents(self.shipping_cents),
            tax: Money::from_cents(self.tax_cents),
            total: Money::from_cents(self.total_cents),
            payment_reference: self.payment_reference,
            provider_transaction_id: self.provider_transaction_id,
            needs_review: self.needs_review,
            tracking_number: self.tracking_number,
            carrier: self.carrier,
            items: items.into_iter().map(OrderItem::from).collect(),
            status_history,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct OrderItemRow {
    pub order_id: Uuid,
    id: Uuid,
    product_id: Uuid,
    product_name: String,
    quantity: i32,
    price_cents: i64,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        OrderItem {
            id: row.id,
            product_id: row.product_id,
            product_name: row.product_name,
            quantity: u32::try_from(row.quantity).unwrap_or_default(),
            price: Money::from_cents(row.price_cents),
        }
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct HistoryRow {
    pub order_id: Uuid,
    status: String,
    notes: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<HistoryRow> for StatusHistoryEntry {
    type Error = ShopError;

    fn try_from(row: HistoryRow) -> ShopResult<Self> {
        Ok(StatusHistoryEntry {
            status: parse_column("status", &row.status)?,
            notes: row.notes,
            created_at: row.created_at,
        })
    }
}
