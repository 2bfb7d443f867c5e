//! bcrypt hashing, run off the async workers.

use atelier_core::{ShopError, ShopResult};

pub async fn hash_password(password: String, cost: u32) -> ShopResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ShopError::Internal(format!("hashing task failed: {e}")))?
        .map_err(|e| ShopError::Internal(format!("password hashing failed: {e}")))
}

/// A malformed stored hash counts as a mismatch
pub async fn verify_password(password: String, hash: String) -> ShopResult<bool> {
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .map_err(|e| ShopError::Internal(format!("verification task failed: {e}")))
}
