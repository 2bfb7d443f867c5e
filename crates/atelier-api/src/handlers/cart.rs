//! Shopping cart of the signed-in user.

use crate::auth::AuthUser;
use crate::error::{ApiResult, ValidJson};
use crate::handlers::MessageResponse;
use crate::state::AppState;
use atelier_core::store::{CartStore, CatalogStore};
use atelier_core::{Cart, CartLine, ShopResult};
use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use validator::Validate;

/// Whole-cart replacement sent by the app after offline edits
#[derive(Debug, Deserialize, Validate)]
pub struct CartSyncRequest {
    #[validate]
    pub items: Vec<CartLine>,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    pub cart: Cart,
}

async fn load_cart(state: &AppState, user_id: Uuid) -> ShopResult<Cart> {
    let lines = state.store.cart_lines(user_id).await?;
    let ids: Vec<Uuid> = lines.iter().map(|l| l.product_id).collect();
    let products = state.store.find_products(&ids).await?;
    Ok(Cart::assemble(user_id, &lines, &products))
}

pub async fn get_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<CartResponse>> {
    let cart = load_cart(&state, user.id()).await?;
    Ok(Json(CartResponse { cart }))
}

/// Adds to an existing line; the merged quantity is checked against stock
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(line): ValidJson<CartLine>,
) -> ApiResult<Json<CartResponse>> {
    let stored = state.store.add_to_cart(user.id(), line).await?;
    debug!(user_id = %user.id(), product_id = %stored.product_id, quantity = stored.quantity, "Cart line updated");
    let cart = load_cart(&state, user.id()).await?;
    Ok(Json(CartResponse { cart }))
}

pub async fn sync_cart(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(request): ValidJson<CartSyncRequest>,
) -> ApiResult<Json<CartResponse>> {
    state.store.replace_cart(user.id(), request.items).await?;
    let cart = load_cart(&state, user.id()).await?;
    Ok(Json(CartResponse { cart }))
}

pub async fn clear_cart(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<MessageResponse>> {
    state.store.clear_cart(user.id()).await?;
    Ok(MessageResponse::new("Cart cleared successfully"))
}
