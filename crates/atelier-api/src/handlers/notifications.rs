//! Device registration and admin-triggered pushes.

use crate::auth::{AdminUser, MaybeUser};
use crate::error::{ApiResult, ValidJson};
use crate::state::AppState;
use atelier_core::store::{DeviceStore, UserStore};
use atelier_core::{PushMessage, PushReport, ShopError};
use axum::{body::Bytes, extract::State, Json};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize)]
pub struct RegisterDeviceRequest {
    pub token: Option<String>,
    pub platform: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RegisterDeviceResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub user_id: Option<Uuid>,
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1))]
    pub body: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    #[serde(default)]
    pub broadcast: bool,
}

#[derive(Debug, Serialize)]
pub struct SendResponse {
    pub message: &'static str,
    pub report: PushReport,
}

/// Save a device token for the caller.
///
/// Always answers success so app start-up never blocks on it: without a
/// valid token the device is registered again after login.
pub async fn register_device(
    State(state): State<AppState>,
    MaybeUser(claims): MaybeUser,
    body: Bytes,
) -> Json<RegisterDeviceResponse> {
    let Some(claims) = claims else {
        debug!("Device registration without a session, skipped");
        return Json(RegisterDeviceResponse {
            success: true,
            message: Some("Registration will complete after login"),
        });
    };

    let request = serde_json::from_slice::<RegisterDeviceRequest>(&body).ok();
    let token = request
        .as_ref()
        .and_then(|r| r.token.as_deref())
        .map(str::trim)
        .filter(|t| !t.is_empty());

    match token {
        Some(token) => {
            let platform = request.as_ref().and_then(|r| r.platform.as_deref());
            match state.store.register_device(claims.sub, token, platform).await {
                Ok(()) => info!(user_id = %claims.sub, platform = ?platform, "Device registered"),
                Err(e) => warn!(user_id = %claims.sub, error = %e, "Device registration failed"),
            }
        }
        None => debug!(user_id = %claims.sub, "Device registration without a token, skipped"),
    }

    Json(RegisterDeviceResponse {
        success: true,
        message: None,
    })
}

/// Push to one user. Broadcast is not offered.
pub async fn send_notification(
    State(state): State<AppState>,
    _admin: AdminUser,
    ValidJson(request): ValidJson<SendRequest>,
) -> ApiResult<Json<SendResponse>> {
    if request.broadcast {
        return Err(ShopError::NotImplemented("Broadcast not yet implemented".to_string()).into());
    }
    let user_id = request
        .user_id
        .ok_or_else(|| ShopError::InvalidRequest("userId required for targeted notification".to_string()))?;

    if state.store.find_user(user_id).await?.is_none() {
        return Err(ShopError::not_found("User", user_id).into());
    }

    let message = PushMessage {
        title: request.title,
        body: request.body,
        data: request.data,
    };
    let report = state.notifier.send_to_user(user_id, &message).await?;
    info!(%user_id, sent = report.sent, failed = report.failed, "Admin push sent");

    Ok(Json(SendResponse {
        message: "Notification sent successfully",
        report,
    }))
}
