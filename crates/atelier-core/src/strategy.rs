//! # Payment Strategy Trait
//!
//! Strategy pattern seam for payment providers. Each provider creates a
//! hosted checkout (or provider order), authenticates its webhooks, and
//! verifies the user-facing return leg. Everything it learns is turned into
//! a [`PaymentSignal`] for the reconciler.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    PaymentStrategy (trait)                  │
//! │  ├── create_checkout()                                      │
//! │  ├── create_payment_intent()   (in-app SDKs, optional)      │
//! │  ├── verify_webhook()                                       │
//! │  ├── verify_return()                                        │
//! │  └── provider()                                             │
//! └─────────────────────────────────────────────────────────────┘
//!                            ▲
//!          ┌─────────────────┼─────────────────┐
//!  ┌───────┴───────┐ ┌───────┴───────┐ ┌───────┴───────┐
//!  │StripeCheckout │ │   Razorpay    │ │     Dodo      │
//!  │   Strategy    │ │   Strategy    │ │   Strategy    │
//!  └───────────────┘ └───────────────┘ └───────────────┘
//! ```

use crate::error::{ShopError, ShopResult};
use crate::money::{Currency, Money};
use crate::order::{Order, PaymentProvider};
use crate::reconcile::PaymentSignal;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use uuid::Uuid;

/// A checkout created by a payment provider
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSession {
    pub provider: PaymentProvider,
    /// Provider session / order / checkout id, stored as the payment reference
    pub session_id: String,
    pub order_id: Uuid,
    /// Hosted page to redirect the customer to (absent for client-side SDK flows)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    /// Amount in minor units, as sent to the provider
    pub amount: i64,
    pub currency: Currency,
    /// Publishable key for client SDKs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Secret an in-app SDK confirms the payment with
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl CheckoutSession {
    pub fn new(
        provider: PaymentProvider,
        session_id: impl Into<String>,
        order: &Order,
        currency: Currency,
    ) -> Self {
        Self {
            provider,
            session_id: session_id.into(),
            order_id: order.id,
            checkout_url: None,
            amount: order.total.cents(),
            currency,
            public_key: None,
            client_secret: None,
            expires_at: None,
        }
    }

    pub fn with_checkout_url(mut self, url: impl Into<String>) -> Self {
        self.checkout_url = Some(url.into());
        self
    }

    pub fn with_public_key(mut self, key: impl Into<String>) -> Self {
        self.public_key = Some(key.into());
        self
    }

    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    pub fn total(&self) -> Money {
        Money::from_cents(self.amount)
    }
}

/// Webhook event categories we act on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookEventType {
    PaymentSucceeded,
    PaymentFailed,
    PaymentCancelled,
    /// Known event that does not settle the payment yet
    PaymentPending,
    /// Unknown event (passthrough)
    Unknown(String),
}

/// A verified, parsed webhook event
#[derive(Debug, Clone, Serialize)]
pub struct WebhookEvent {
    pub event_id: String,
    /// Provider's raw event name, e.g. `checkout.session.completed`
    pub raw_type: String,
    pub event_type: WebhookEventType,
    pub provider: PaymentProvider,
    /// Absent when the event carries nothing to reconcile
    pub signal: Option<PaymentSignal>,
    pub received_at: DateTime<Utc>,
}

impl WebhookEvent {
    pub fn new(
        provider: PaymentProvider,
        event_id: impl Into<String>,
        raw_type: impl Into<String>,
        event_type: WebhookEventType,
        signal: Option<PaymentSignal>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            raw_type: raw_type.into(),
            event_type,
            provider,
            signal,
            received_at: Utc::now(),
        }
    }
}

/// Request headers relevant to webhook verification, keyed by lowercase name
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders(BTreeMap<String, String>);

impl WebhookHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.0.insert(name.to_ascii_lowercase(), value.into());
    }

    pub fn with(mut self, name: &str, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    /// Fetch a header the provider must always send
    pub fn require(&self, name: &str) -> ShopResult<&str> {
        self.get(name)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ShopError::SignatureInvalid(format!("missing {name} header")))
    }
}

/// Query or body parameters of a return redirect / client verification
pub type ReturnParams = HashMap<String, String>;

/// Core trait for payment provider implementations.
#[async_trait]
pub trait PaymentStrategy: Send + Sync {
    /// Create a checkout for `order`.
    async fn create_checkout(&self, order: &Order, urls: &CheckoutUrls) -> ShopResult<CheckoutSession>;

    /// Create a payment the mobile SDK confirms on the device. The returned
    /// session carries the client secret.
    async fn create_payment_intent(&self, order: &Order) -> ShopResult<CheckoutSession> {
        Err(ShopError::NotImplemented(format!(
            "{} does not offer in-app payment intents (order {})",
            self.provider_name(),
            order.id
        )))
    }

    /// Verify a webhook signature and parse the event.
    async fn verify_webhook(&self, payload: &[u8], headers: &WebhookHeaders) -> ShopResult<WebhookEvent>;

    /// Authenticate the return leg (redirect or client callback) and turn it
    /// into a signal. Query values are never trusted without a provider
    /// lookup or signature check.
    async fn verify_return(&self, params: &ReturnParams) -> ShopResult<PaymentSignal>;

    fn provider(&self) -> PaymentProvider;

    /// Get the provider name (for logging and routing).
    fn provider_name(&self) -> &'static str {
        self.provider().name()
    }

    /// Webhook event names this strategy acts on
    fn handled_events(&self) -> &'static [&'static str];
}

/// Type alias for a boxed payment strategy (dynamic dispatch)
pub type BoxedPaymentStrategy = Arc<dyn PaymentStrategy>;

/// Registry of configured providers
#[derive(Clone, Default)]
pub struct PaymentStrategySelector {
    strategies: HashMap<PaymentProvider, BoxedPaymentStrategy>,
}

impl PaymentStrategySelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a payment strategy
    pub fn register(&mut self, strategy: BoxedPaymentStrategy) {
        self.strategies.insert(strategy.provider(), strategy);
    }

    /// Register with builder pattern
    pub fn with_strategy(mut self, strategy: BoxedPaymentStrategy) -> Self {
        self.register(strategy);
        self
    }

    pub fn get(&self, provider: PaymentProvider) -> Option<&BoxedPaymentStrategy> {
        self.strategies.get(&provider)
    }

    /// Like [`get`](Self::get) but a missing provider is an error
    pub fn require(&self, provider: PaymentProvider) -> ShopResult<&BoxedPaymentStrategy> {
        self.get(provider).ok_or_else(|| {
            ShopError::Configuration(format!("{} payments are not configured", provider.display_name()))
        })
    }

    /// List all registered providers, sorted by name
    pub fn providers(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.strategies.keys().map(|p| p.name()).collect();
        names.sort_unstable();
        names
    }

    pub fn has_provider(&self, provider: PaymentProvider) -> bool {
        self.strategies.contains_key(&provider)
    }
}

/// Public base URL of this API, used for provider return and webhook URLs
#[derive(Debug, Clone)]
pub struct CheckoutUrls {
    pub base_url: String,
}

impl CheckoutUrls {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn payments(&self, provider: PaymentProvider) -> String {
        format!("{}/api/payments/{}", self.base_url, provider.name())
    }

    /// Stripe substitutes `{CHECKOUT_SESSION_ID}` itself
    pub fn stripe_success_url(&self) -> String {
        format!(
            "{}/return?session_id={{CHECKOUT_SESSION_ID}}",
            self.payments(PaymentProvider::Stripe)
        )
    }

    pub fn stripe_cancel_url(&self, order_id: Uuid) -> String {
        format!("{}/cancel?orderId={order_id}", self.payments(PaymentProvider::Stripe))
    }

    pub fn return_url(&self, provider: PaymentProvider, order_id: Uuid) -> String {
        format!("{}/return?orderId={order_id}", self.payments(provider))
    }

    pub fn webhook_url(&self, provider: PaymentProvider) -> String {
        format!("{}/webhook", self.payments(provider))
    }
}

impl Default for CheckoutUrls {
    fn default() -> Self {
        Self::new("http://localhost:3000")
    }
}

/// Deep links back into the mobile app after a redirect
#[derive(Debug, Clone)]
pub struct AppRedirects {
    pub deep_link_base: String,
}

impl AppRedirects {
    pub fn new(deep_link_base: impl Into<String>) -> Self {
        let mut base = deep_link_base.into();
        if !base.ends_with('/') {
            base.push('/');
        }
        Self {
            deep_link_base: base,
        }
    }

    pub fn success(&self, order_id: Uuid) -> String {
        format!("{}checkout/success?orderId={order_id}", self.deep_link_base)
    }

    /// `order_id` is omitted when the order could not be identified
    pub fn error(&self, code: &str, order_id: Option<Uuid>) -> String {
        match order_id {
            Some(id) => format!("{}checkout?error={code}&orderId={id}", self.deep_link_base),
            None => format!("{}checkout?error={code}", self.deep_link_base),
        }
    }
}

impl Default for AppRedirects {
    fn default() -> Self {
        Self::new("atelier://")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkout_urls() {
        let urls = CheckoutUrls::new("https://api.atelier.shop/");
        let id = Uuid::nil();

        assert_eq!(
            urls.stripe_success_url(),
            "https://api.atelier.shop/api/payments/stripe/return?session_id={CHECKOUT_SESSION_ID}"
        );
        assert_eq!(
            urls.stripe_cancel_url(id),
            format!("https://api.atelier.shop/api/payments/stripe/cancel?orderId={id}")
        );
        assert_eq!(
            urls.webhook_url(PaymentProvider::Dodo),
            "https://api.atelier.shop/api/payments/dodo/webhook"
        );
    }

    #[test]
    fn test_app_redirects() {
        let redirects = AppRedirects::new("atelier://");
        let id = Uuid::nil();

        assert_eq!(redirects.success(id), format!("atelier://checkout/success?orderId={id}"));
        assert_eq!(
            redirects.error("payment_failed", Some(id)),
            format!("atelier://checkout?error=payment_failed&orderId={id}")
        );
        assert_eq!(redirects.error("missing_session", None), "atelier://checkout?error=missing_session");
    }

    #[test]
    fn test_webhook_headers_case_insensitive() {
        let headers = WebhookHeaders::new().with("Stripe-Signature", "t=1,v1=ab");
        assert_eq!(headers.get("stripe-signature"), Some("t=1,v1=ab"));
        assert!(headers.require("webhook-id").is_err());
    }

    #[test]
    fn test_strategy_selector() {
        let selector = PaymentStrategySelector::new();

        assert!(selector.providers().is_empty());
        assert!(selector.require(PaymentProvider::Stripe).is_err());
    }
}
