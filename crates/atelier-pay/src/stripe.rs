//! # Stripe
//!
//! Two ways to pay an order:
//!
//! - hosted Checkout Sessions, confirmed by the return redirect or the
//!   `checkout.session.*` webhooks
//! - Payment Intents for the in-app PaymentSheet, confirmed by the
//!   `payment_intent.succeeded` webhook
//!
//! The session or intent id is stored as a payment reference of the order.
//! The order id also travels in the metadata so intent events can be traced
//! back. Both ids are written as `order_id` and `orderId`; older app builds
//! read the camel-case key.

use crate::config::StripeConfig;
use crate::http::{http_client, send_json};
use crate::signature::verify_stripe_signature;
use async_trait::async_trait;
use atelier_core::{
    CheckoutSession, CheckoutUrls, Currency, Order, OrderLookup, PaymentOutcome, PaymentProvider,
    PaymentSignal, PaymentStrategy, ReturnParams, ShopError, ShopResult, SignalSource,
    WebhookEvent, WebhookEventType, WebhookHeaders,
};
use chrono::DateTime;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Events enabled on the Stripe webhook endpoint
pub const STRIPE_WEBHOOK_EVENTS: &[&str] = &[
    "checkout.session.completed",
    "checkout.session.async_payment_succeeded",
    "checkout.session.async_payment_failed",
    "checkout.session.expired",
    "payment_intent.succeeded",
    "payment_intent.payment_failed",
];

/// Stripe Checkout Session strategy
pub struct StripeCheckoutStrategy {
    config: StripeConfig,
    client: Client,
}

impl StripeCheckoutStrategy {
    pub fn new(config: StripeConfig) -> ShopResult<Self> {
        Ok(Self {
            config,
            client: http_client()?,
        })
    }

    /// Create from environment variables
    pub fn from_env(default_currency: Currency) -> ShopResult<Self> {
        Self::new(StripeConfig::from_env(default_currency)?)
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }

    /// Form fields for `POST /v1/checkout/sessions`
    fn checkout_form(&self, order: &Order, urls: &CheckoutUrls) -> Vec<(String, String)> {
        let currency = self.config.currency.as_str();
        let order_id = order.id.to_string();

        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("success_url".into(), urls.stripe_success_url()),
            ("cancel_url".into(), urls.stripe_cancel_url(order.id)),
            ("client_reference_id".into(), order_id.clone()),
            ("customer_email".into(), order.user_email.clone()),
            ("metadata[order_id]".into(), order_id.clone()),
            ("metadata[order_number]".into(), order.order_number.clone()),
            ("payment_intent_data[metadata][order_id]".into(), order_id),
        ];

        let mut lines: Vec<(String, i64, u32)> = order
            .items
            .iter()
            .map(|item| (item.product_name.clone(), item.price.cents(), item.quantity))
            .collect();
        if order.shipping_cost.is_positive() {
            lines.push(("Shipping".into(), order.shipping_cost.cents(), 1));
        }
        if order.tax.is_positive() {
            lines.push(("Sales tax".into(), order.tax.cents(), 1));
        }

        for (i, (name, unit_amount, quantity)) in lines.into_iter().enumerate() {
            form.push((format!("line_items[{i}][price_data][currency]"), currency.to_string()));
            form.push((format!("line_items[{i}][price_data][unit_amount]"), unit_amount.to_string()));
            form.push((format!("line_items[{i}][price_data][product_data][name]"), name));
            form.push((format!("line_items[{i}][quantity]"), quantity.to_string()));
        }

        form
    }

    /// Form fields for `POST /v1/payment_intents`
    fn intent_form(&self, order: &Order) -> Vec<(String, String)> {
        let order_id = order.id.to_string();
        vec![
            ("amount".into(), order.total.cents().to_string()),
            ("currency".into(), self.config.currency.as_str().to_string()),
            ("receipt_email".into(), order.user_email.clone()),
            ("metadata[order_id]".into(), order_id.clone()),
            ("metadata[orderId]".into(), order_id),
            ("metadata[orderNumber]".into(), order.order_number.clone()),
            ("automatic_payment_methods[enabled]".into(), "true".into()),
        ]
    }

    async fn retrieve_session(&self, session_id: &str) -> ShopResult<StripeSession> {
        let url = format!("{}/v1/checkout/sessions/{session_id}", self.config.api_base_url);
        let request = self
            .client
            .get(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version);
        send_json(PaymentProvider::Stripe, request).await
    }
}

#[async_trait]
impl PaymentStrategy for StripeCheckoutStrategy {
    #[instrument(skip(self, order, urls), fields(order_id = %order.id))]
    async fn create_checkout(&self, order: &Order, urls: &CheckoutUrls) -> ShopResult<CheckoutSession> {
        if order.items.is_empty() {
            return Err(ShopError::InvalidRequest("Order has no items".to_string()));
        }

        let form = self.checkout_form(order, urls);
        debug!(fields = form.len(), "Creating Stripe checkout session");

        let url = format!("{}/v1/checkout/sessions", self.config.api_base_url);
        let request = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .header("Idempotency-Key", format!("checkout-{}", order.payment_attempt_key()))
            .form(&form);

        let session: StripeSession = send_json(PaymentProvider::Stripe, request).await?;
        let checkout_url = session.url.clone().ok_or_else(|| ShopError::ProviderError {
            provider: "stripe".to_string(),
            message: "checkout session has no url".to_string(),
        })?;

        info!(session_id = %session.id, "Created Stripe checkout session");

        let mut checkout = CheckoutSession::new(
            PaymentProvider::Stripe,
            session.id,
            order,
            self.config.currency,
        )
        .with_checkout_url(checkout_url);
        checkout.expires_at = session.expires_at.and_then(|ts| DateTime::from_timestamp(ts, 0));
        if let Some(pk) = &self.config.publishable_key {
            checkout = checkout.with_public_key(pk.clone());
        }
        Ok(checkout)
    }

    #[instrument(skip(self, order), fields(order_id = %order.id))]
    async fn create_payment_intent(&self, order: &Order) -> ShopResult<CheckoutSession> {
        let url = format!("{}/v1/payment_intents", self.config.api_base_url);
        let request = self
            .client
            .post(&url)
            .header("Authorization", self.config.auth_header())
            .header("Stripe-Version", &self.config.api_version)
            .header("Idempotency-Key", format!("intent-{}", order.payment_attempt_key()))
            .form(&self.intent_form(order));

        let intent: StripePaymentIntent = send_json(PaymentProvider::Stripe, request).await?;
        let client_secret = intent.client_secret.clone().ok_or_else(|| ShopError::ProviderError {
            provider: "stripe".to_string(),
            message: "payment intent has no client secret".to_string(),
        })?;

        info!(payment_intent = %intent.id, "Created Stripe payment intent");

        let mut session = CheckoutSession::new(PaymentProvider::Stripe, intent.id, order, self.config.currency)
            .with_client_secret(client_secret);
        if let Some(pk) = &self.config.publishable_key {
            session = session.with_public_key(pk.clone());
        }
        Ok(session)
    }

    #[instrument(skip(self, payload, headers))]
    async fn verify_webhook(&self, payload: &[u8], headers: &WebhookHeaders) -> ShopResult<WebhookEvent> {
        let signature = headers.require("stripe-signature")?;
        verify_stripe_signature(&self.config.webhook_secret, payload, signature)?;

        let event: StripeWebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| ShopError::WebhookParseError(format!("Failed to parse webhook: {e}")))?;

        debug!(event_type = %event.event_type, "Verified Stripe webhook");

        let (event_type, signal) = event_signal(&event.event_type, event.data.object)?;
        let signal = signal.map(|s| s.with_event_id(event.id.clone()));

        Ok(WebhookEvent::new(
            PaymentProvider::Stripe,
            event.id,
            event.event_type,
            event_type,
            signal,
        ))
    }

    /// `session_id` from the success redirect; the session is fetched from
    /// Stripe rather than trusting the redirect.
    #[instrument(skip(self, params))]
    async fn verify_return(&self, params: &ReturnParams) -> ShopResult<PaymentSignal> {
        let session_id = params
            .get("session_id")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| ShopError::InvalidRequest("session_id is required".to_string()))?;

        let session = self.retrieve_session(session_id).await?;
        let outcome = if session.is_paid() {
            PaymentOutcome::Succeeded
        } else if session.status.as_deref() == Some("expired") {
            PaymentOutcome::Cancelled
        } else {
            PaymentOutcome::Pending
        };

        Ok(session.signal(outcome, SignalSource::Redirect))
    }

    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Stripe
    }

    fn handled_events(&self) -> &'static [&'static str] {
        STRIPE_WEBHOOK_EVENTS
    }
}

/// Map a verified event onto a reconciliation signal
fn event_signal(
    raw_type: &str,
    object: Value,
) -> ShopResult<(WebhookEventType, Option<PaymentSignal>)> {
    let session_outcome = match raw_type {
        "checkout.session.completed" => None,
        "checkout.session.async_payment_succeeded" => Some(PaymentOutcome::Succeeded),
        "checkout.session.async_payment_failed" => Some(PaymentOutcome::Failed),
        "checkout.session.expired" => Some(PaymentOutcome::Cancelled),
        "payment_intent.succeeded" | "payment_intent.payment_failed" => {
            let outcome = if raw_type == "payment_intent.succeeded" {
                PaymentOutcome::Succeeded
            } else {
                PaymentOutcome::Failed
            };
            let intent: StripePaymentIntent = serde_json::from_value(object)
                .map_err(|e| ShopError::WebhookParseError(format!("payment intent: {e}")))?;
            return Ok((event_type_for(outcome), Some(intent.signal(outcome))));
        }
        other => return Ok((WebhookEventType::Unknown(other.to_string()), None)),
    };

    let session: StripeSession = serde_json::from_value(object)
        .map_err(|e| ShopError::WebhookParseError(format!("checkout session: {e}")))?;
    let outcome = session_outcome.unwrap_or(if session.is_paid() {
        PaymentOutcome::Succeeded
    } else {
        PaymentOutcome::Pending
    });

    Ok((event_type_for(outcome), Some(session.signal(outcome, SignalSource::Webhook))))
}

fn event_type_for(outcome: PaymentOutcome) -> WebhookEventType {
    match outcome {
        PaymentOutcome::Succeeded => WebhookEventType::PaymentSucceeded,
        PaymentOutcome::Failed => WebhookEventType::PaymentFailed,
        PaymentOutcome::Cancelled => WebhookEventType::PaymentCancelled,
        PaymentOutcome::Pending => WebhookEventType::PaymentPending,
    }
}

fn metadata_order_id(metadata: &HashMap<String, String>) -> Option<Uuid> {
    ["order_id", "orderId"]
        .iter()
        .find_map(|key| metadata.get(*key))
        .and_then(|id| id.parse().ok())
}

// =============================================================================
// Stripe API Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeSession {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    payment_intent: Option<Value>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    #[serde(default)]
    expires_at: Option<i64>,
}

impl StripeSession {
    fn is_paid(&self) -> bool {
        self.payment_status.as_deref() == Some("paid")
    }

    /// Expanded or not, the intent id is what we keep
    fn payment_intent_id(&self) -> Option<String> {
        match &self.payment_intent {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Object(obj)) => obj.get("id").and_then(Value::as_str).map(String::from),
            _ => None,
        }
    }

    fn signal(&self, outcome: PaymentOutcome, source: SignalSource) -> PaymentSignal {
        let lookup = match metadata_order_id(&self.metadata) {
            Some(order_id) => OrderLookup::OrderId(order_id),
            None => OrderLookup::PaymentReference(self.id.clone()),
        };
        PaymentSignal::new(PaymentProvider::Stripe, lookup, outcome, source)
            .with_transaction(self.payment_intent_id())
    }
}

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    #[serde(default)]
    client_secret: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl StripePaymentIntent {
    /// Intents created here carry the order id; the intent id is a stored
    /// payment reference as a fallback.
    fn signal(&self, outcome: PaymentOutcome) -> PaymentSignal {
        let lookup = match metadata_order_id(&self.metadata) {
            Some(order_id) => OrderLookup::OrderId(order_id),
            None => OrderLookup::PaymentReference(self.id.clone()),
        };
        PaymentSignal::new(PaymentProvider::Stripe, lookup, outcome, SignalSource::Webhook)
            .with_transaction(Some(self.id.clone()))
    }
}

#[derive(Debug, Deserialize)]
struct StripeWebhookEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: Value,
}
