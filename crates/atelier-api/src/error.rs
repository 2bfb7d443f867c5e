//! # API Errors
//!
//! Every failing handler answers `{ "error", "code", "details"? }`.

use atelier_core::ShopError;
use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::error;
use validator::{Validate, ValidationErrors};

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, code: u16) -> Self {
        Self {
            error: error.into(),
            code,
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Shop(#[from] ShopError),

    #[error("Validation failed")]
    Validation(#[from] ValidationErrors),

    #[error("Malformed request body: {0}")]
    Body(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self {
            ApiError::Shop(err) => {
                let code = err.status_code();
                if err.is_client_facing() {
                    ErrorResponse::new(err.to_string(), code)
                } else {
                    error!(error = %err, "Request failed");
                    ErrorResponse::new("Internal server error", code)
                }
            }
            ApiError::Validation(errors) => ErrorResponse::new("Validation failed", 400)
                .with_details(serde_json::to_value(&errors).unwrap_or(Value::Null)),
            ApiError::Body(message) => ErrorResponse::new(message, 400),
        };

        let status = StatusCode::from_u16(body.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(body)).into_response()
    }
}

/// JSON body that is deserialized and then validated
pub struct ValidJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| ApiError::Body(e.body_text()))?;
        value.validate()?;
        Ok(ValidJson(value))
    }
}
