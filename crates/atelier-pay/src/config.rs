//! # Provider Configuration
//!
//! Configuration for the Stripe, Razorpay and Dodo integrations.
//! All secrets are loaded from environment variables; a provider whose
//! variables are missing is simply not registered.

use crate::signature::decode_standard_webhook_secret;
use atelier_core::{Currency, ShopError, ShopResult};
use std::env;

fn required(name: &str) -> ShopResult<String> {
    match env::var(name) {
        Ok(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
        _ => Err(ShopError::Configuration(format!("{name} not set"))),
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn currency_or(name: &str, default: Currency) -> ShopResult<Currency> {
    match optional(name) {
        Some(code) => code.parse().map_err(ShopError::Configuration),
        None => Ok(default),
    }
}

// =============================================================================
// Stripe
// =============================================================================

/// Stripe API configuration
#[derive(Debug, Clone)]
pub struct StripeConfig {
    /// Secret API key (sk_test_... or sk_live_...)
    pub secret_key: String,

    /// Publishable key (pk_test_... or pk_live_...), handed to clients
    pub publishable_key: Option<String>,

    /// Webhook signing secret (whsec_...)
    pub webhook_secret: String,

    pub currency: Currency,

    /// API base URL (for testing/mocking)
    pub api_base_url: String,

    /// API version
    pub api_version: String,
}

impl StripeConfig {
    /// Load configuration from environment variables.
    ///
    /// Required env vars:
    /// - `STRIPE_SECRET_KEY`
    /// - `STRIPE_WEBHOOK_SECRET`
    ///
    /// Optional: `STRIPE_PUBLISHABLE_KEY`, `STRIPE_CURRENCY`, `STRIPE_API_BASE`
    pub fn from_env(default_currency: Currency) -> ShopResult<Self> {
        dotenvy::dotenv().ok();

        let secret_key = required("STRIPE_SECRET_KEY")?;
        let webhook_secret = required("STRIPE_WEBHOOK_SECRET")?;
        let publishable_key = optional("STRIPE_PUBLISHABLE_KEY");

        if !secret_key.starts_with("sk_test_") && !secret_key.starts_with("sk_live_") {
            return Err(ShopError::Configuration(
                "STRIPE_SECRET_KEY must start with sk_test_ or sk_live_".to_string(),
            ));
        }

        if let Some(pk) = &publishable_key {
            if !pk.starts_with("pk_test_") && !pk.starts_with("pk_live_") {
                return Err(ShopError::Configuration(
                    "STRIPE_PUBLISHABLE_KEY must start with pk_test_ or pk_live_".to_string(),
                ));
            }
        }

        if !webhook_secret.starts_with("whsec_") {
            return Err(ShopError::Configuration(
                "STRIPE_WEBHOOK_SECRET must start with whsec_".to_string(),
            ));
        }

        let mut config = Self::new(secret_key, webhook_secret);
        config.publishable_key = publishable_key;
        config.currency = currency_or("STRIPE_CURRENCY", default_currency)?;
        if let Some(base) = optional("STRIPE_API_BASE") {
            config.api_base_url = base;
        }
        Ok(config)
    }

    /// Create config with explicit values (for testing)
    pub fn new(secret_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            secret_key: secret_key.into(),
            publishable_key: None,
            webhook_secret: webhook_secret.into(),
            currency: Currency::USD,
            api_base_url: "https://api.stripe.com".to_string(),
            api_version: "2024-12-18.acacia".to_string(),
        }
    }

    /// Check if using test keys
    pub fn is_test_mode(&self) -> bool {
        self.secret_key.starts_with("sk_test_")
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Bearer {}", self.secret_key)
    }

    /// Builder: set custom API base URL (for testing)
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

// =============================================================================
// Razorpay
// =============================================================================

#[derive(Debug, Clone)]
pub struct RazorpayConfig {
    pub key_id: String,
    /// Signs client-side payment verifications
    pub key_secret: String,
    /// Signs webhooks; configured separately in the Razorpay dashboard
    pub webhook_secret: String,
    pub currency: Currency,
    pub api_base_url: String,
}

impl RazorpayConfig {
    /// Required: `RAZORPAY_KEY_ID`, `RAZORPAY_KEY_SECRET`, `RAZORPAY_WEBHOOK_SECRET`.
    /// Optional: `RAZORPAY_CURRENCY` (default INR), `RAZORPAY_API_BASE`.
    pub fn from_env() -> ShopResult<Self> {
        dotenvy::dotenv().ok();

        let key_id = required("RAZORPAY_KEY_ID")?;
        if !key_id.starts_with("rzp_") {
            return Err(ShopError::Configuration(
                "RAZORPAY_KEY_ID must start with rzp_".to_string(),
            ));
        }

        let mut config = Self::new(
            key_id,
            required("RAZORPAY_KEY_SECRET")?,
            required("RAZORPAY_WEBHOOK_SECRET")?,
        );
        config.currency = currency_or("RAZORPAY_CURRENCY", Currency::INR)?;
        if let Some(base) = optional("RAZORPAY_API_BASE") {
            config.api_base_url = base;
        }
        Ok(config)
    }

    pub fn new(
        key_id: impl Into<String>,
        key_secret: impl Into<String>,
        webhook_secret: impl Into<String>,
    ) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: key_secret.into(),
            webhook_secret: webhook_secret.into(),
            currency: Currency::INR,
            api_base_url: "https://api.razorpay.com".to_string(),
        }
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

// =============================================================================
// Dodo Payments
// =============================================================================

#[derive(Debug, Clone)]
pub struct DodoConfig {
    pub api_key: String,
    /// Decoded Standard Webhooks signing key
    pub webhook_key: Vec<u8>,
    pub currency: Currency,
    pub api_base_url: String,
}

impl DodoConfig {
    /// Required: `DODO_API_KEY`, `DODO_WEBHOOK_SECRET` (`whsec_<base64>` or bare base64).
    /// Optional: `DODO_API_BASE` (default test environment), `DODO_CURRENCY`.
    pub fn from_env(default_currency: Currency) -> ShopResult<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::new(required("DODO_API_KEY")?, &required("DODO_WEBHOOK_SECRET")?)?;
        config.currency = currency_or("DODO_CURRENCY", default_currency)?;
        if let Some(base) = optional("DODO_API_BASE") {
            config.api_base_url = base;
        }
        Ok(config)
    }

    pub fn new(api_key: impl Into<String>, webhook_secret: &str) -> ShopResult<Self> {
        Ok(Self {
            api_key: api_key.into(),
            webhook_key: decode_standard_webhook_secret(webhook_secret)?,
            currency: Currency::USD,
            api_base_url: "https://test.dodopayments.com".to_string(),
        })
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stripe_config() {
        let config = StripeConfig::new("sk_test_abc123", "whsec_secret");
        assert!(config.is_test_mode());
        assert_eq!(config.auth_header(), "Bearer sk_test_abc123");

        let config = StripeConfig::new("sk_live_abc123", "whsec_secret");
        assert!(!config.is_test_mode());
    }

    #[test]
    fn test_dodo_secret_prefix_is_optional() {
        // "c2VjcmV0" is base64 for "secret"
        let prefixed = DodoConfig::new("key", "whsec_c2VjcmV0").unwrap();
        let bare = DodoConfig::new("key", "c2VjcmV0").unwrap();

        assert_eq!(prefixed.webhook_key, b"secret");
        assert_eq!(bare.webhook_key, b"secret");
        assert!(DodoConfig::new("key", "whsec_!!!").is_err());
    }

    #[test]
    fn test_razorpay_defaults_to_inr() {
        let config = RazorpayConfig::new("rzp_test_1", "secret", "hook");
        assert_eq!(config.currency, Currency::INR);
    }
}
