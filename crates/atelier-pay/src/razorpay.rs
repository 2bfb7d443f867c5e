//! # Razorpay Orders
//!
//! Razorpay checkout runs in the client SDK: we create a Razorpay order,
//! hand its id and our key id to the app, and the app posts the payment
//! result back for signature verification.

use crate::config::RazorpayConfig;
use crate::http::{http_client, send_json};
use crate::signature::verify_hex;
use async_trait::async_trait;
use atelier_core::{
    CheckoutSession, CheckoutUrls, Order, OrderLookup, PaymentOutcome, PaymentProvider,
    PaymentSignal, PaymentStrategy, ReturnParams, ShopError, ShopResult, SignalSource,
    WebhookEvent, WebhookEventType, WebhookHeaders,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument};

pub const RAZORPAY_WEBHOOK_EVENTS: &[&str] = &["payment.captured", "payment.failed", "order.paid"];

pub struct RazorpayStrategy {
    config: RazorpayConfig,
    client: Client,
}

impl RazorpayStrategy {
    pub fn new(config: RazorpayConfig) -> ShopResult<Self> {
        Ok(Self {
            config,
            client: http_client()?,
        })
    }

    pub fn from_env() -> ShopResult<Self> {
        Self::new(RazorpayConfig::from_env()?)
    }

    fn param<'a>(params: &'a ReturnParams, name: &str) -> ShopResult<&'a str> {
        params
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ShopError::InvalidRequest(format!("{name} is required")))
    }
}

#[async_trait]
impl PaymentStrategy for RazorpayStrategy {
    #[instrument(skip(self, order, _urls), fields(order_id = %order.id))]
    async fn create_checkout(&self, order: &Order, _urls: &CheckoutUrls) -> ShopResult<CheckoutSession> {
        let body = json!({
            "amount": order.total.cents(),
            "currency": self.config.currency.code(),
            "receipt": order.order_number,
            "notes": { "order_id": order.id.to_string() },
        });

        let request = self
            .client
            .post(format!("{}/v1/orders", self.config.api_base_url))
            .basic_auth(&self.config.key_id, Some(&self.config.key_secret))
            .json(&body);

        let created: RazorpayOrder = send_json(PaymentProvider::Razorpay, request).await?;
        info!(razorpay_order_id = %created.id, "Created Razorpay order");

        Ok(
            CheckoutSession::new(PaymentProvider::Razorpay, created.id, order, self.config.currency)
                .with_public_key(self.config.key_id.clone()),
        )
    }

    #[instrument(skip(self, payload, headers))]
    async fn verify_webhook(&self, payload: &[u8], headers: &WebhookHeaders) -> ShopResult<WebhookEvent> {
        let signature = headers.require("x-razorpay-signature")?;
        if !verify_hex(self.config.webhook_secret.as_bytes(), &[payload], signature) {
            return Err(ShopError::SignatureInvalid("Signature mismatch".to_string()));
        }

        let event: RazorpayWebhook = serde_json::from_slice(payload)
            .map_err(|e| ShopError::WebhookParseError(format!("Failed to parse webhook: {e}")))?;
        debug!(event = %event.event, "Verified Razorpay webhook");

        let payment = event.payload.pointer("/payment/entity");
        let payment_id = payment
            .and_then(|p| p.get("id"))
            .and_then(Value::as_str)
            .map(String::from);

        let (event_type, outcome, razorpay_order_id) = match event.event.as_str() {
            "payment.captured" => (
                WebhookEventType::PaymentSucceeded,
                PaymentOutcome::Succeeded,
                payment.and_then(|p| p.get("order_id")).and_then(Value::as_str),
            ),
            "order.paid" => (
                WebhookEventType::PaymentSucceeded,
                PaymentOutcome::Succeeded,
                event.payload.pointer("/order/entity/id").and_then(Value::as_str),
            ),
            "payment.failed" => (
                WebhookEventType::PaymentFailed,
                PaymentOutcome::Failed,
                payment.and_then(|p| p.get("order_id")).and_then(Value::as_str),
            ),
            other => (WebhookEventType::Unknown(other.to_string()), PaymentOutcome::Pending, None),
        };

        let event_id = headers
            .get("x-razorpay-event-id")
            .map(String::from)
            .or_else(|| payment_id.as_ref().map(|id| format!("{}:{id}", event.event)))
            .unwrap_or_else(|| event.event.clone());

        let signal = match (&event_type, razorpay_order_id) {
            (WebhookEventType::Unknown(_), _) | (_, None) => None,
            (_, Some(order_ref)) => Some(
                PaymentSignal::new(
                    PaymentProvider::Razorpay,
                    OrderLookup::PaymentReference(order_ref.to_string()),
                    outcome,
                    SignalSource::Webhook,
                )
                .with_transaction(payment_id.clone())
                .with_event_id(event_id.clone()),
            ),
        };

        Ok(WebhookEvent::new(
            PaymentProvider::Razorpay,
            event_id,
            event.event.clone(),
            event_type,
            signal,
        ))
    }

    /// Client callback: `razorpay_order_id`, `razorpay_payment_id`,
    /// `razorpay_signature` = hex HMAC of `"{order_id}|{payment_id}"`.
    #[instrument(skip(self, params))]
    async fn verify_return(&self, params: &ReturnParams) -> ShopResult<PaymentSignal> {
        let order_id = Self::param(params, "razorpay_order_id")?;
        let payment_id = Self::param(params, "razorpay_payment_id")?;
        let signature = Self::param(params, "razorpay_signature")?;

        let parts: [&[u8]; 3] = [order_id.as_bytes(), b"|", payment_id.as_bytes()];
        if !verify_hex(self.config.key_secret.as_bytes(), &parts, signature) {
            return Err(ShopError::SignatureInvalid(
                "Payment signature mismatch".to_string(),
            ));
        }

        Ok(PaymentSignal::new(
            PaymentProvider::Razorpay,
            OrderLookup::PaymentReference(order_id.to_string()),
            PaymentOutcome::Succeeded,
            SignalSource::ClientVerification,
        )
        .with_transaction(Some(payment_id.to_string())))
    }

    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Razorpay
    }

    fn handled_events(&self) -> &'static [&'static str] {
        RAZORPAY_WEBHOOK_EVENTS
    }
}

#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayWebhook {
    event: String,
    #[serde(default)]
    payload: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::hmac_sha256_hex;
    use crate::test_support::sample_order;
    use atelier_core::Currency;
    use wiremock::matchers::{body_partial_json, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn strategy(base: &str) -> RazorpayStrategy {
        let config = RazorpayConfig::new("rzp_test_key", "key_secret", "hook_secret").with_api_base_url(base);
        RazorpayStrategy::new(config).unwrap()
    }

    fn callback(order_id: &str, payment_id: &str, signature: &str) -> ReturnParams {
        ReturnParams::from([
            ("razorpay_order_id".to_string(), order_id.to_string()),
            ("razorpay_payment_id".to_string(), payment_id.to_string()),
            ("razorpay_signature".to_string(), signature.to_string()),
        ])
    }

    #[tokio::test]
    async fn test_payment_intents_not_offered() {
        let err = strategy("http://localhost")
            .create_payment_intent(&sample_order(PaymentProvider::Razorpay))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::NotImplemented(_)));
        assert_eq!(err.status_code(), 501);
    }

    #[tokio::test]
    async fn test_create_order() {
        let server = MockServer::start().await;
        let order = sample_order(PaymentProvider::Razorpay);

        Mock::given(method("POST"))
            .and(path("/v1/orders"))
            .and(header_exists("authorization"))
            .and(body_partial_json(json!({
                "amount": 54_340,
                "currency": "INR",
                "receipt": order.order_number,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "order_Nx1",
                "amount": 54_340,
                "currency": "INR",
                "status": "created"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = strategy(&server.uri())
            .create_checkout(&order, &CheckoutUrls::default())
            .await
            .unwrap();

        assert_eq!(session.session_id, "order_Nx1");
        assert_eq!(session.currency, Currency::INR);
        assert_eq!(session.public_key.as_deref(), Some("rzp_test_key"));
        assert!(session.checkout_url.is_none());
    }

    #[tokio::test]
    async fn test_client_verification() {
        let sig = hmac_sha256_hex(b"key_secret", &[b"order_Nx1|pay_77"]);
        let signal = strategy("http://localhost")
            .verify_return(&callback("order_Nx1", "pay_77", &sig))
            .await
            .unwrap();

        assert_eq!(signal.lookup, OrderLookup::PaymentReference("order_Nx1".into()));
        assert_eq!(signal.transaction_id.as_deref(), Some("pay_77"));
        assert_eq!(signal.source, SignalSource::ClientVerification);

        let err = strategy("http://localhost")
            .verify_return(&callback("order_Nx1", "pay_78", &sig))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::SignatureInvalid(_)));
    }

    #[tokio::test]
    async fn test_client_verification_missing_fields() {
        let err = strategy("http://localhost")
            .verify_return(&ReturnParams::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_webhook_payment_captured() {
        let body = serde_json::to_vec(&json!({
            "event": "payment.captured",
            "payload": { "payment": { "entity": { "id": "pay_1", "order_id": "order_Nx1" } } }
        }))
        .unwrap();
        let headers = WebhookHeaders::new()
            .with("X-Razorpay-Signature", hmac_sha256_hex(b"hook_secret", &[body.as_slice()]))
            .with("X-Razorpay-Event-Id", "evt_rzp_1");

        let event = strategy("http://localhost").verify_webhook(&body, &headers).await.unwrap();
        let signal = event.signal.unwrap();

        assert_eq!(event.event_id, "evt_rzp_1");
        assert_eq!(signal.outcome, PaymentOutcome::Succeeded);
        assert_eq!(signal.lookup, OrderLookup::PaymentReference("order_Nx1".into()));
        assert_eq!(signal.transaction_id.as_deref(), Some("pay_1"));
    }

    #[tokio::test]
    async fn test_webhook_order_paid_and_failed() {
        let s = strategy("http://localhost");

        let paid = serde_json::to_vec(&json!({
            "event": "order.paid",
            "payload": { "order": { "entity": { "id": "order_Nx2" } } }
        }))
        .unwrap();
        let headers = WebhookHeaders::new().with("x-razorpay-signature", hmac_sha256_hex(b"hook_secret", &[paid.as_slice()]));
        let event = s.verify_webhook(&paid, &headers).await.unwrap();
        assert_eq!(
            event.signal.unwrap().lookup,
            OrderLookup::PaymentReference("order_Nx2".into())
        );

        let failed = serde_json::to_vec(&json!({
            "event": "payment.failed",
            "payload": { "payment": { "entity": { "id": "pay_2", "order_id": "order_Nx2" } } }
        }))
        .unwrap();
        let headers = WebhookHeaders::new().with("x-razorpay-signature", hmac_sha256_hex(b"hook_secret", &[failed.as_slice()]));
        let event = s.verify_webhook(&failed, &headers).await.unwrap();
        assert_eq!(event.event_type, WebhookEventType::PaymentFailed);
        assert_eq!(event.signal.unwrap().outcome, PaymentOutcome::Failed);
    }

    #[tokio::test]
    async fn test_webhook_signed_with_key_secret_is_rejected() {
        let body = br#"{"event":"payment.captured","payload":{}}"#;
        let headers = WebhookHeaders::new().with("x-razorpay-signature", hmac_sha256_hex(b"key_secret", &[&body[..]]));

        let err = strategy("http://localhost").verify_webhook(body, &headers).await.unwrap_err();
        assert!(matches!(err, ShopError::SignatureInvalid(_)));
    }
}
