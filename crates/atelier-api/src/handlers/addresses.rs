//! Shipping addresses of the signed-in user.

use crate::auth::AuthUser;
use crate::error::{ApiResult, ValidJson};
use crate::handlers::MessageResponse;
use crate::state::AppState;
use atelier_core::store::AddressStore;
use atelier_core::{Address, AddressPatch, NewAddress, ShopError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct AddressResponse {
    pub address: Address,
}

#[derive(Debug, Serialize)]
pub struct AddressListResponse {
    pub addresses: Vec<Address>,
}

/// Default first, then newest first
pub async fn list_addresses(State(state): State<AppState>, user: AuthUser) -> ApiResult<Json<AddressListResponse>> {
    let addresses = state.store.list_addresses(user.id()).await?;
    Ok(Json(AddressListResponse { addresses }))
}

pub async fn create_address(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(request): ValidJson<NewAddress>,
) -> ApiResult<(StatusCode, Json<AddressResponse>)> {
    let address = state.store.create_address(user.id(), request).await?;
    info!(user_id = %user.id(), address_id = %address.id, is_default = address.is_default, "Address created");
    Ok((StatusCode::CREATED, Json(AddressResponse { address })))
}

pub async fn get_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AddressResponse>> {
    let address = state
        .store
        .find_address(user.id(), id)
        .await?
        .ok_or_else(|| ShopError::not_found("Address", id))?;
    Ok(Json(AddressResponse { address }))
}

pub async fn update_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    ValidJson(patch): ValidJson<AddressPatch>,
) -> ApiResult<Json<AddressResponse>> {
    let address = state.store.update_address(user.id(), id, patch).await?;
    Ok(Json(AddressResponse { address }))
}

/// Refused while an order references the address
pub async fn delete_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    state.store.delete_address(user.id(), id).await?;
    info!(user_id = %user.id(), address_id = %id, "Address deleted");
    Ok(MessageResponse::new("Address deleted successfully"))
}

pub async fn set_default_address(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<AddressResponse>> {
    let address = state.store.set_default_address(user.id(), id).await?;
    Ok(Json(AddressResponse { address }))
}
