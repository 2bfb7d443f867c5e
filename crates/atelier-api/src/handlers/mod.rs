//! # Request Handlers
//!
//! Axum handlers grouped by resource. Every handler returns
//! [`ApiResult`](crate::error::ApiResult) and leaves status mapping to
//! [`ApiError`](crate::error::ApiError).

pub mod addresses;
pub mod admin;
pub mod auth;
pub mod cart;
pub mod notifications;
pub mod orders;
pub mod payments;
pub mod products;
pub mod upload;
pub mod wishlist;

use crate::state::AppState;
use atelier_core::Page;
use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

/// `{ "message": ... }`
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Json<Self> {
        Json(Self {
            message: message.into(),
        })
    }
}

/// Page metadata returned next to listed items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: u64,
    pub total_pages: u64,
}

impl<T> From<&Page<T>> for Pagination {
    fn from(page: &Page<T>) -> Self {
        Self {
            page: page.request.page,
            limit: page.request.limit,
            total: page.total,
            total_pages: page.total_pages(),
        }
    }
}

/// Raw `page` / `limit` query values, normalized by `PageRequest`
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let storage = match state.store.ping().await {
        Ok(()) => "ok",
        Err(e) => {
            warn!(error = %e, "Storage health check failed");
            "unavailable"
        }
    };

    Json(json!({
        "status": if storage == "ok" { "healthy" } else { "degraded" },
        "service": "atelier",
        "version": env!("CARGO_PKG_VERSION"),
        "storage": { "backend": state.store.backend(), "status": storage },
        "providers": state.strategies.providers(),
        "push": state.notifier.name(),
    }))
}
