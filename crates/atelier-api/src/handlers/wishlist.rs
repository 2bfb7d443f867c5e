//! Wishlist of the signed-in user.

use crate::auth::AuthUser;
use crate::error::{ApiResult, ValidJson};
use crate::state::AppState;
use atelier_core::store::WishlistStore;
use atelier_core::{WishlistEntry, WishlistToggle};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ToggleRequest {
    pub product_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistResponse {
    pub wishlist_items: Vec<WishlistEntry>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleResponse {
    pub message: &'static str,
    pub in_wishlist: bool,
}

pub async fn list_wishlist(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<WishlistResponse>> {
    let wishlist_items = state.store.list_wishlist(user.id()).await?;
    Ok(Json(WishlistResponse { wishlist_items }))
}

/// Adds the product, or removes it when already present
pub async fn toggle_wishlist(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(request): ValidJson<ToggleRequest>,
) -> ApiResult<Json<ToggleResponse>> {
    let toggle = state.store.toggle_wishlist(user.id(), request.product_id).await?;
    Ok(Json(ToggleResponse {
        message: toggle.message(),
        in_wishlist: toggle == WishlistToggle::Added,
    }))
}
