//! # Authentication
//!
//! Bearer-token extractors. Handlers take [`AuthUser`] for any signed-in
//! account, [`AdminUser`] for admin routes and [`MaybeUser`] where a token
//! is optional.

pub mod jwt;
pub mod password;

use crate::error::ApiError;
use crate::state::AppState;
use atelier_core::{Role, ShopError};
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use uuid::Uuid;

pub use jwt::{Claims, TokenKeys, TokenPair};
pub use password::{hash_password, verify_password};

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verified claims of the caller
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    pub fn id(&self) -> Uuid {
        self.0.sub
    }
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)
            .ok_or_else(|| ShopError::Unauthorized("Missing bearer token".to_string()))?;
        Ok(AuthUser(state.tokens.verify_access(token)?))
    }
}

/// Caller with the ADMIN role
#[derive(Debug, Clone)]
pub struct AdminUser(pub Claims);

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let AuthUser(claims) = AuthUser::from_request_parts(parts, state).await?;
        if claims.role != Role::Admin {
            return Err(ShopError::Forbidden("Admin access required".to_string()).into());
        }
        Ok(AdminUser(claims))
    }
}

/// Claims when a valid token is present; a bad token is treated as none
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<Claims>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            bearer_token(parts).and_then(|t| state.tokens.verify_access(t).ok()),
        ))
    }
}
