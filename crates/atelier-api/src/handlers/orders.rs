//! Orders: placement, history and admin fulfilment updates.

use crate::auth::{AdminUser, AuthUser};
use crate::error::{ApiResult, ValidJson};
use crate::state::AppState;
use atelier_core::order::status_push_message;
use atelier_core::store::{OrderStore, UserStore};
use atelier_core::{Buyer, Order, OrderRequest, PushMessage, ShopError, StatusUpdate};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub order: Order,
}

#[derive(Debug, Serialize)]
pub struct OrderListResponse {
    pub orders: Vec<Order>,
}

/// Newest first
pub async fn list_orders(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<OrderListResponse>> {
    let orders = state.store.list_orders_for_user(user.id()).await?;
    Ok(Json(OrderListResponse { orders }))
}

/// Place a PLACED+PENDING order from the requested lines. Stock is
/// checked here and only decremented once payment is confirmed.
#[instrument(skip_all, fields(user_id = %user.id(), lines = request.items.len()))]
pub async fn create_order(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(request): ValidJson<OrderRequest>,
) -> ApiResult<(StatusCode, Json<OrderResponse>)> {
    let account = state
        .store
        .find_user(user.id())
        .await?
        .ok_or_else(|| ShopError::Unauthorized("Account no longer exists".to_string()))?;

    let buyer = Buyer {
        user_id: account.id,
        email: account.email.clone(),
        name: account.full_name(),
    };
    let order = state.store.place_order(&buyer, &request).await?;

    info!(
        order_id = %order.id,
        order_number = %order.order_number,
        total = %order.total.display(state.config.store_currency),
        provider = order.payment_method.name(),
        "Order placed"
    );
    Ok((StatusCode::CREATED, Json(OrderResponse { order })))
}

/// Owner only
pub async fn get_order(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<OrderResponse>> {
    let order = state
        .store
        .find_order(id)
        .await?
        .ok_or_else(|| ShopError::not_found("Order", id))?;
    if order.user_id != user.id() {
        return Err(ShopError::Forbidden("Not your order".to_string()).into());
    }
    Ok(Json(OrderResponse { order }))
}

/// Admin status change; the owner is notified for customer-visible steps
#[instrument(skip_all, fields(order_id = %id, status = %update.status))]
pub async fn update_order_status(
    State(state): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    ValidJson(update): ValidJson<StatusUpdate>,
) -> ApiResult<Json<OrderResponse>> {
    let order = state.store.update_order_status(id, &update).await?;
    info!(payment_status = ?order.payment_status, "Order status updated");

    if let Some(body) = status_push_message(order.status, order.tracking_number.as_deref()) {
        let message = PushMessage::order_update(order.id, body);
        if let Err(e) = state.notifier.send_to_user(order.user_id, &message).await {
            warn!(error = %e, "Status push failed");
        }
    }

    Ok(Json(OrderResponse { order }))
}
