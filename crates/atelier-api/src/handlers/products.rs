//! Catalog: products and categories.

use crate::auth::AdminUser;
use crate::error::{ApiResult, ValidJson};
use crate::handlers::{MessageResponse, Pagination};
use crate::state::AppState;
use atelier_core::product::DEFAULT_PAGE_SIZE;
use atelier_core::store::CatalogStore;
use atelier_core::{Category, NewCategory, NewProduct, PageRequest, Product, ProductPatch, ProductQuery, ShopError};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

/// `GET /api/products` query string
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListParams {
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub featured: Option<bool>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

impl ProductListParams {
    pub fn into_query(self) -> ProductQuery {
        ProductQuery {
            category_id: self.category_id,
            featured_only: self.featured.unwrap_or(false),
            page: PageRequest::normalize(self.page, self.limit, DEFAULT_PAGE_SIZE),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProductListResponse {
    pub products: Vec<Product>,
    pub pagination: Pagination,
}

#[derive(Debug, Serialize)]
pub struct ProductResponse {
    pub product: Product,
}

#[derive(Debug, Serialize)]
pub struct CategoryListResponse {
    pub categories: Vec<Category>,
}

#[derive(Debug, Serialize)]
pub struct CategoryResponse {
    pub category: Category,
}

/// Active products only
pub async fn list_products(
    State(state): State<AppState>,
    Query(params): Query<ProductListParams>,
) -> ApiResult<Json<ProductListResponse>> {
    let page = state.store.list_products(params.into_query()).await?;
    Ok(Json(ProductListResponse {
        pagination: Pagination::from(&page),
        products: page.items,
    }))
}

pub async fn get_product(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<ProductResponse>> {
    let product = state
        .store
        .find_product(id)
        .await?
        .ok_or_else(|| ShopError::not_found("Product", id))?;
    Ok(Json(ProductResponse { product }))
}

#[instrument(skip_all, fields(style_code = %request.style_code))]
pub async fn create_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(request): ValidJson<NewProduct>,
) -> ApiResult<(StatusCode, Json<ProductResponse>)> {
    let product = state.store.create_product(request).await?;
    info!(product_id = %product.id, "Product created");
    Ok((StatusCode::CREATED, Json(ProductResponse { product })))
}

/// Partial update; absent fields keep their value
pub async fn update_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    ValidJson(patch): ValidJson<ProductPatch>,
) -> ApiResult<Json<ProductResponse>> {
    let product = state.store.update_product(id, patch).await?;
    info!(product_id = %id, "Product updated");
    Ok(Json(ProductResponse { product }))
}

pub async fn delete_product(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    state.store.delete_product(id).await?;
    info!(product_id = %id, "Product deleted");
    Ok(MessageResponse::new("Product deleted successfully"))
}

pub async fn list_categories(State(state): State<AppState>) -> ApiResult<Json<CategoryListResponse>> {
    let categories = state.store.list_categories().await?;
    Ok(Json(CategoryListResponse { categories }))
}

pub async fn create_category(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(request): ValidJson<NewCategory>,
) -> ApiResult<(StatusCode, Json<CategoryResponse>)> {
    let category = state.store.create_category(request).await?;
    info!(category_id = %category.id, slug = %category.slug, "Category created");
    Ok((StatusCode::CREATED, Json(CategoryResponse { category })))
}
