//! HS256 access and refresh tokens, each signed with its own secret.

use atelier_core::{Role, ShopError, ShopResult, User};
use chrono::Utc;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

struct KeyPair {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl_secs: i64,
}

impl KeyPair {
    fn new(secret: &str, ttl_secs: i64) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl_secs,
        }
    }

    fn issue(&self, user: &User) -> ShopResult<String> {
        let iat = Utc::now().timestamp();
        let claims = Claims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat,
            exp: iat + self.ttl_secs,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| ShopError::Internal(format!("token encoding failed: {e}")))
    }

    fn verify(&self, token: &str) -> ShopResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => ShopError::Unauthorized("Token expired".to_string()),
                _ => ShopError::Unauthorized("Invalid token".to_string()),
            })
    }
}

/// Signing keys for both token kinds
pub struct TokenKeys {
    access: KeyPair,
    refresh: KeyPair,
}

impl TokenKeys {
    pub fn new(access_secret: &str, refresh_secret: &str, access_ttl_secs: i64, refresh_ttl_secs: i64) -> Self {
        Self {
            access: KeyPair::new(access_secret, access_ttl_secs),
            refresh: KeyPair::new(refresh_secret, refresh_ttl_secs),
        }
    }

    pub fn issue_pair(&self, user: &User) -> ShopResult<TokenPair> {
        Ok(TokenPair {
            access_token: self.access.issue(user)?,
            refresh_token: self.refresh.issue(user)?,
        })
    }

    pub fn verify_access(&self, token: &str) -> ShopResult<Claims> {
        self.access.verify(token)
    }

    pub fn verify_refresh(&self, token: &str) -> ShopResult<Claims> {
        self.refresh.verify(token)
    }
}
