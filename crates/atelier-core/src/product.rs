//! # Product Types
//!
//! Catalog types for the atelier storefront: products, categories,
//! admin inputs and paginated listing queries.

use crate::money::Money;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Default page size for storefront listings
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// Default page size for admin listings
pub const ADMIN_PAGE_SIZE: u32 = 50;
/// Upper bound for any listing page size
pub const MAX_PAGE_SIZE: u32 = 100;

/// A product category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Display position, ascending
    pub order: i32,
    pub created_at: DateTime<Utc>,
}

/// Input for creating a category
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub slug: String,
    pub description: Option<String>,
    #[validate(url)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub order: i32,
}

impl NewCategory {
    pub fn into_category(self) -> Category {
        Category {
            id: Uuid::new_v4(),
            name: self.name,
            slug: self.slug,
            description: self.description,
            image_url: self.image_url,
            order: self.order,
            created_at: Utc::now(),
        }
    }
}

/// A catalog product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub style_code: String,
    pub description: String,
    pub price: Money,
    /// Units on hand; never negative
    pub stock: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category_id: Option<Uuid>,
    pub materials: Vec<String>,
    pub dimensions: String,
    pub care_instructions: String,
    pub images: Vec<String>,
    pub is_active: bool,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Whether `quantity` units can currently be sold
    pub fn can_fulfil(&self, quantity: u32) -> bool {
        self.is_active && i64::from(self.stock) >= i64::from(quantity)
    }

    /// Apply a partial update in place
    pub fn apply(&mut self, patch: ProductPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(style_code) = patch.style_code {
            self.style_code = style_code;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(price) = patch.price {
            self.price = price;
        }
        if let Some(stock) = patch.stock {
            self.stock = stock;
        }
        if let Some(category_id) = patch.category_id {
            self.category_id = Some(category_id);
        }
        if let Some(materials) = patch.materials {
            self.materials = materials;
        }
        if let Some(dimensions) = patch.dimensions {
            self.dimensions = dimensions;
        }
        if let Some(care_instructions) = patch.care_instructions {
            self.care_instructions = care_instructions;
        }
        if let Some(images) = patch.images {
            self.images = images;
        }
        if let Some(is_active) = patch.is_active {
            self.is_active = is_active;
        }
        if let Some(is_featured) = patch.is_featured {
            self.is_featured = is_featured;
        }
        self.updated_at = Utc::now();
    }
}

fn positive_price(price: &Money) -> Result<(), ValidationError> {
    if price.is_positive() {
        Ok(())
    } else {
        Err(ValidationError::new("price_must_be_positive"))
    }
}

fn image_urls(images: &Vec<String>) -> Result<(), ValidationError> {
    if images.is_empty() {
        return Err(ValidationError::new("at_least_one_image"));
    }
    if images.iter().all(|url| validator::validate_url(url.as_str())) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_image_url"))
    }
}

fn non_empty_entries(values: &Vec<String>) -> Result<(), ValidationError> {
    if values.iter().any(|v| v.trim().is_empty()) {
        Err(ValidationError::new("empty_entry"))
    } else {
        Ok(())
    }
}

/// Input for creating a product
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 50))]
    pub style_code: String,
    #[validate(length(min = 1))]
    pub description: String,
    #[validate(custom = "positive_price")]
    pub price: Money,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub stock: i32,
    pub category_id: Option<Uuid>,
    #[validate(length(min = 1), custom = "non_empty_entries")]
    pub materials: Vec<String>,
    #[validate(length(min = 1))]
    pub dimensions: String,
    #[validate(length(min = 1))]
    pub care_instructions: String,
    #[validate(custom = "image_urls")]
    pub images: Vec<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_featured: bool,
}

fn default_true() -> bool {
    true
}

impl NewProduct {
    pub fn into_product(self) -> Product {
        let now = Utc::now();
        Product {
            id: Uuid::new_v4(),
            name: self.name,
            style_code: self.style_code,
            description: self.description,
            price: self.price,
            stock: self.stock,
            category_id: self.category_id,
            materials: self.materials,
            dimensions: self.dimensions,
            care_instructions: self.care_instructions,
            images: self.images,
            is_active: self.is_active,
            is_featured: self.is_featured,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial product update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProductPatch {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub style_code: Option<String>,
    #[validate(length(min = 1))]
    pub description: Option<String>,
    #[validate(custom = "positive_price")]
    pub price: Option<Money>,
    #[validate(range(min = 0))]
    pub stock: Option<i32>,
    pub category_id: Option<Uuid>,
    #[validate(length(min = 1), custom = "non_empty_entries")]
    pub materials: Option<Vec<String>>,
    #[validate(length(min = 1))]
    pub dimensions: Option<String>,
    #[validate(length(min = 1))]
    pub care_instructions: Option<String>,
    #[validate(custom = "image_urls")]
    pub images: Option<Vec<String>>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
}

/// Storefront listing filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProductQuery {
    pub category_id: Option<Uuid>,
    pub featured_only: bool,
    pub page: PageRequest,
}

/// Normalized page/limit pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    /// Clamp raw query values: page below 1 becomes 1, a missing or zero
    /// limit falls back to `default_limit`, and limits cap at [`MAX_PAGE_SIZE`].
    pub fn normalize(page: Option<i64>, limit: Option<i64>, default_limit: u32) -> Self {
        let page = match page {
            Some(p) if p >= 1 => u32::try_from(p).unwrap_or(u32::MAX),
            _ => 1,
        };
        let limit = match limit {
            Some(l) if l >= 1 => u32::try_from(l.min(i64::from(MAX_PAGE_SIZE))).unwrap_or(MAX_PAGE_SIZE),
            _ => default_limit,
        };
        Self { page, limit }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of results with the total match count
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub request: PageRequest,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> u64 {
        self.total.div_ceil(u64::from(self.request.limit))
    }
}

/// Admin listing row: product with usage counters
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductWithCounts {
    #[serde(flatten)]
    pub product: Product,
    pub order_item_count: u64,
    pub wishlist_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_product() -> NewProduct {
        NewProduct {
            name: "Aurelia Tote".into(),
            style_code: "AT-001".into(),
            description: "Hand-stitched calfskin tote".into(),
            price: Money::from_cents(125_000),
            stock: 4,
            category_id: None,
            materials: vec!["Calfskin".into()],
            dimensions: "40 x 30 x 15 cm".into(),
            care_instructions: "Keep dry".into(),
            images: vec!["https://cdn.atelier.shop/at-001.jpg".into()],
            is_active: true,
            is_featured: false,
        }
    }

    #[test]
    fn test_new_product_validation() {
        assert!(new_product().validate().is_ok());

        let mut bad = new_product();
        bad.price = Money::ZERO;
        assert!(bad.validate().is_err());

        let mut bad = new_product();
        bad.images = vec!["not a url".into()];
        assert!(bad.validate().is_err());

        let mut bad = new_product();
        bad.materials.clear();
        assert!(bad.validate().is_err());

        let mut bad = new_product();
        bad.stock = -1;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_patch_applies_only_present_fields() {
        let mut product = new_product().into_product();
        product.apply(ProductPatch {
            stock: Some(9),
            is_featured: Some(true),
            ..Default::default()
        });

        assert_eq!(product.stock, 9);
        assert!(product.is_featured);
        assert_eq!(product.name, "Aurelia Tote");
    }

    #[test]
    fn test_can_fulfil() {
        let mut product = new_product().into_product();
        assert!(product.can_fulfil(4));
        assert!(!product.can_fulfil(5));

        product.is_active = false;
        assert!(!product.can_fulfil(1));
    }

    #[test]
    fn test_page_request_normalize() {
        let p = PageRequest::normalize(Some(0), Some(500), DEFAULT_PAGE_SIZE);
        assert_eq!(p, PageRequest { page: 1, limit: 100 });

        let p = PageRequest::normalize(None, None, ADMIN_PAGE_SIZE);
        assert_eq!(p.limit, 50);

        let p = PageRequest::normalize(Some(3), Some(20), DEFAULT_PAGE_SIZE);
        assert_eq!(p.offset(), 40);
    }

    #[test]
    fn test_total_pages() {
        let page: Page<()> = Page {
            items: vec![],
            request: PageRequest { page: 1, limit: 20 },
            total: 41,
        };
        assert_eq!(page.total_pages(), 3);
    }
}
