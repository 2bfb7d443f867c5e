//! Admin dashboard data.

use crate::auth::AdminUser;
use crate::error::ApiResult;
use crate::handlers::{PageParams, Pagination};
use crate::state::AppState;
use atelier_core::product::ADMIN_PAGE_SIZE;
use atelier_core::store::{AnalyticsStore, CatalogStore};
use atelier_core::{Analytics, PageRequest, ProductWithCounts};
use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct AdminProductsResponse {
    pub products: Vec<ProductWithCounts>,
    pub pagination: Pagination,
}

/// Every product, active or not, with usage counters
pub async fn list_products(
    State(state): State<AppState>,
    _admin: AdminUser,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<AdminProductsResponse>> {
    let request = PageRequest::normalize(params.page, params.limit, ADMIN_PAGE_SIZE);
    let page = state.store.list_products_with_counts(request).await?;
    Ok(Json(AdminProductsResponse {
        pagination: Pagination::from(&page),
        products: page.items,
    }))
}

pub async fn analytics(State(state): State<AppState>, _admin: AdminUser) -> ApiResult<Json<Analytics>> {
    Ok(Json(state.store.analytics().await?))
}
