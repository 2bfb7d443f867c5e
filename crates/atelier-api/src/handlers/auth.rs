//! Registration, login and token refresh.

use crate::auth::{hash_password, verify_password, AuthUser, Claims, TokenPair};
use crate::error::{ApiResult, ValidJson};
use crate::state::AppState;
use atelier_core::store::UserStore;
use atelier_core::{NewUser, Role, ShopError, User};
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6))]
    pub password: String,
    #[validate(length(min = 1))]
    pub first_name: String,
    #[validate(length(min = 1))]
    pub last_name: String,
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user: User,
    #[serde(flatten)]
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub valid: bool,
    pub payload: Claims,
}

fn invalid_credentials() -> ShopError {
    ShopError::Unauthorized("Invalid credentials".to_string())
}

/// Create a CUSTOMER account and sign it in
#[instrument(skip_all, fields(email = %request.email))]
pub async fn register(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let email = request.email.trim().to_lowercase();
    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(ShopError::InvalidRequest("Email already registered".to_string()).into());
    }

    let password_hash = hash_password(request.password, state.config.bcrypt_cost).await?;
    let user = state
        .store
        .create_user(NewUser {
            email,
            password_hash,
            first_name: request.first_name,
            last_name: request.last_name,
            phone: request.phone.filter(|p| !p.trim().is_empty()),
            role: Role::Customer,
        })
        .await
        .map_err(|e| match e {
            ShopError::Conflict(message) => ShopError::InvalidRequest(message),
            other => other,
        })?;

    let tokens = state.tokens.issue_pair(&user)?;
    info!(user_id = %user.id, "Account registered");
    Ok((StatusCode::CREATED, Json(AuthResponse { user, tokens })))
}

#[instrument(skip_all, fields(email = %request.email))]
pub async fn login(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let user = state
        .store
        .find_user_by_email(&request.email.trim().to_lowercase())
        .await?
        .ok_or_else(invalid_credentials)?;

    if !verify_password(request.password, user.password_hash.clone()).await? {
        return Err(invalid_credentials().into());
    }

    let tokens = state.tokens.issue_pair(&user)?;
    info!(user_id = %user.id, "Signed in");
    Ok(Json(AuthResponse { user, tokens }))
}

/// Exchange a refresh token for a new pair
pub async fn refresh(
    State(state): State<AppState>,
    ValidJson(request): ValidJson<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let claims = state.tokens.verify_refresh(&request.refresh_token)?;
    let user = state
        .store
        .find_user(claims.sub)
        .await?
        .ok_or_else(|| ShopError::not_found("User", claims.sub))?;
    Ok(Json(state.tokens.issue_pair(&user)?))
}

pub async fn verify(AuthUser(claims): AuthUser) -> Json<VerifyResponse> {
    Json(VerifyResponse {
        valid: true,
        payload: claims,
    })
}
