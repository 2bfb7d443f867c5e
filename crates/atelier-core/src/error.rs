//! # Error Types
//!
//! Typed error handling for the atelier storefront.
//! Store, provider and domain operations all return `Result<T, ShopError>`.

use thiserror::Error;
use uuid::Uuid;

/// Core error type for storefront operations
#[derive(Debug, Error)]
pub enum ShopError {
    /// Configuration errors (missing keys, invalid config)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid request data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or invalid credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Unique constraint or reference conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Product cannot be ordered in the requested quantity
    #[error("Insufficient stock for product {product_id}")]
    InsufficientStock { product_id: Uuid },

    /// Product exists but is not purchasable
    #[error("Product is not available: {product_id}")]
    ProductUnavailable { product_id: Uuid },

    /// Payment provider API error
    #[error("Provider error [{provider}]: {message}")]
    ProviderError { provider: String, message: String },

    /// Network/HTTP error communicating with a provider
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Webhook or callback signature verification failed
    #[error("Signature verification failed: {0}")]
    SignatureInvalid(String),

    /// Webhook payload parsing error
    #[error("Webhook parse error: {0}")]
    WebhookParseError(String),

    /// Feature intentionally not offered
    #[error("Not implemented: {0}")]
    NotImplemented(String),

    /// Transaction aborted by a deadlock or serialization failure
    #[error("Storage contention: {0}")]
    Contention(String),

    /// Database failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ShopError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        ShopError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns true if retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ShopError::Contention(_) | ShopError::NetworkError(_))
    }

    /// Returns the HTTP status code appropriate for this error
    pub fn status_code(&self) -> u16 {
        match self {
            ShopError::Configuration(_) => 500,
            ShopError::InvalidRequest(_) => 400,
            ShopError::Unauthorized(_) => 401,
            ShopError::Forbidden(_) => 403,
            ShopError::NotFound { .. } => 404,
            ShopError::Conflict(_) => 409,
            ShopError::InsufficientStock { .. } => 400,
            ShopError::ProductUnavailable { .. } => 400,
            ShopError::ProviderError { .. } => 502,
            ShopError::NetworkError(_) => 503,
            ShopError::SignatureInvalid(_) => 400,
            ShopError::WebhookParseError(_) => 400,
            ShopError::NotImplemented(_) => 501,
            ShopError::Contention(_) => 503,
            ShopError::Storage(_) => 500,
            ShopError::Serialization(_) => 500,
            ShopError::Internal(_) => 500,
        }
    }

    /// Whether the message may be shown to API clients verbatim
    pub fn is_client_facing(&self) -> bool {
        self.status_code() < 500 || matches!(self, ShopError::NotImplemented(_))
    }
}

impl From<serde_json::Error> for ShopError {
    fn from(err: serde_json::Error) -> Self {
        ShopError::Serialization(err.to_string())
    }
}

/// Result type alias for storefront operations
pub type ShopResult<T> = Result<T, ShopError>;
