//! # Dodo Payments
//!
//! Hosted payment links. The order id travels in the link metadata and in
//! the return URL; webhooks follow the Standard Webhooks scheme.

use crate::config::DodoConfig;
use crate::http::{http_client, send_json};
use crate::signature::verify_standard_webhook;
use async_trait::async_trait;
use atelier_core::{
    CheckoutSession, CheckoutUrls, Order, OrderLookup, PaymentOutcome, PaymentProvider,
    PaymentSignal, PaymentStrategy, ReturnParams, ShopError, ShopResult, SignalSource,
    WebhookEvent, WebhookEventType, WebhookHeaders,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

pub const DODO_WEBHOOK_EVENTS: &[&str] = &["payment.succeeded", "payment.failed", "payment.cancelled"];

pub struct DodoStrategy {
    config: DodoConfig,
    client: Client,
}

impl DodoStrategy {
    pub fn new(config: DodoConfig) -> ShopResult<Self> {
        Ok(Self {
            config,
            client: http_client()?,
        })
    }

    pub fn from_env(default_currency: atelier_core::Currency) -> ShopResult<Self> {
        Self::new(DodoConfig::from_env(default_currency)?)
    }

    fn auth_header(&self) -> String {
        format!("Bearer {}", self.config.api_key)
    }

    async fn retrieve_payment(&self, payment_id: &str) -> ShopResult<DodoPayment> {
        let request = self
            .client
            .get(format!("{}/payments/{payment_id}", self.config.api_base_url))
            .header("Authorization", self.auth_header());
        send_json(PaymentProvider::Dodo, request).await
    }
}

/// Provider status string to outcome; anything unsettled is pending
fn status_outcome(status: &str) -> PaymentOutcome {
    match status {
        "succeeded" => PaymentOutcome::Succeeded,
        "failed" => PaymentOutcome::Failed,
        "cancelled" => PaymentOutcome::Cancelled,
        _ => PaymentOutcome::Pending,
    }
}

#[async_trait]
impl PaymentStrategy for DodoStrategy {
    #[instrument(skip(self, order, urls), fields(order_id = %order.id))]
    async fn create_checkout(&self, order: &Order, urls: &CheckoutUrls) -> ShopResult<CheckoutSession> {
        let body = json!({
            "amount": order.total.cents(),
            "currency": self.config.currency.code(),
            "customer_email": order.user_email,
            "customer_name": order.user_name,
            "metadata": {
                "order_id": order.id.to_string(),
                "order_number": order.order_number,
                "user_id": order.user_id.to_string(),
            },
            "return_url": urls.return_url(PaymentProvider::Dodo, order.id),
            "webhook_url": urls.webhook_url(PaymentProvider::Dodo),
        });

        let request = self
            .client
            .post(format!("{}/api/payment-links", self.config.api_base_url))
            .header("Authorization", self.auth_header())
            .json(&body);

        let link: DodoPaymentLink = send_json(PaymentProvider::Dodo, request).await?;
        let checkout_url = link.url.or(link.checkout_url).ok_or_else(|| ShopError::ProviderError {
            provider: "dodo".to_string(),
            message: "payment link response has no checkout url".to_string(),
        })?;

        info!(dodo_id = %link.id, "Created Dodo payment link");

        Ok(
            CheckoutSession::new(PaymentProvider::Dodo, link.id, order, self.config.currency)
                .with_checkout_url(checkout_url),
        )
    }

    #[instrument(skip(self, payload, headers))]
    async fn verify_webhook(&self, payload: &[u8], headers: &WebhookHeaders) -> ShopResult<WebhookEvent> {
        let webhook_id = headers.require("webhook-id")?;
        verify_standard_webhook(
            &self.config.webhook_key,
            webhook_id,
            headers.require("webhook-timestamp")?,
            payload,
            headers.require("webhook-signature")?,
        )?;

        let event: DodoWebhook = serde_json::from_slice(payload)
            .map_err(|e| ShopError::WebhookParseError(format!("Failed to parse webhook: {e}")))?;
        let raw_type = event
            .event_type
            .or(event.legacy_event_type)
            .ok_or_else(|| ShopError::WebhookParseError("event type missing".to_string()))?;
        debug!(event_type = %raw_type, "Verified Dodo webhook");

        // Older deliveries nest the payment under data.payload
        let data = match event.data.get("payload").filter(|p| p.is_object()).cloned() {
            Some(inner) => inner,
            None => event.data,
        };

        let (event_type, outcome) = match raw_type.as_str() {
            "payment.succeeded" => (WebhookEventType::PaymentSucceeded, PaymentOutcome::Succeeded),
            "payment.failed" => (WebhookEventType::PaymentFailed, PaymentOutcome::Failed),
            "payment.cancelled" => (WebhookEventType::PaymentCancelled, PaymentOutcome::Cancelled),
            "payment.processing" => (WebhookEventType::PaymentPending, PaymentOutcome::Pending),
            other => (WebhookEventType::Unknown(other.to_string()), PaymentOutcome::Pending),
        };

        let order_id = data
            .pointer("/metadata/order_id")
            .and_then(Value::as_str)
            .and_then(|id| id.parse::<Uuid>().ok());
        let payment_id = data.get("payment_id").and_then(Value::as_str).map(String::from);

        let signal = match (&event_type, order_id) {
            (WebhookEventType::Unknown(_), _) => None,
            (_, None) => {
                warn!(event_type = %raw_type, "Dodo webhook without order metadata");
                None
            }
            (_, Some(order_id)) => Some(
                PaymentSignal::new(
                    PaymentProvider::Dodo,
                    OrderLookup::OrderId(order_id),
                    outcome,
                    SignalSource::Webhook,
                )
                .with_transaction(payment_id)
                .with_event_id(webhook_id),
            ),
        };

        Ok(WebhookEvent::new(PaymentProvider::Dodo, webhook_id, raw_type, event_type, signal))
    }

    /// `orderId`, `payment_id` and `status` come from the redirect. The status
    /// is only trusted after fetching the payment from Dodo.
    #[instrument(skip(self, params))]
    async fn verify_return(&self, params: &ReturnParams) -> ShopResult<PaymentSignal> {
        let order_id: Uuid = params
            .get("orderId")
            .ok_or_else(|| ShopError::InvalidRequest("orderId is required".to_string()))?
            .parse()
            .map_err(|_| ShopError::InvalidRequest("orderId is not a valid id".to_string()))?;

        let Some(payment_id) = params.get("payment_id").filter(|p| !p.is_empty()) else {
            debug!(%order_id, "Dodo return without payment id");
            return Ok(PaymentSignal::new(
                PaymentProvider::Dodo,
                OrderLookup::OrderId(order_id),
                PaymentOutcome::Pending,
                SignalSource::Redirect,
            ));
        };

        let payment = self.retrieve_payment(payment_id).await?;
        if let Some(paid_for) = payment.order_id() {
            if paid_for != order_id {
                return Err(ShopError::InvalidRequest(
                    "payment does not belong to this order".to_string(),
                ));
            }
        }

        let claimed = params.get("status").map(String::as_str).unwrap_or_default();
        if claimed != payment.status {
            debug!(%order_id, claimed, actual = %payment.status, "Dodo return status differs from provider");
        }

        Ok(PaymentSignal::new(
            PaymentProvider::Dodo,
            OrderLookup::OrderId(order_id),
            status_outcome(&payment.status),
            SignalSource::Redirect,
        )
        .with_transaction(Some(payment.payment_id)))
    }

    fn provider(&self) -> PaymentProvider {
        PaymentProvider::Dodo
    }

    fn handled_events(&self) -> &'static [&'static str] {
        DODO_WEBHOOK_EVENTS
    }
}

#[derive(Debug, Deserialize)]
struct DodoPaymentLink {
    #[serde(alias = "payment_id")]
    id: String,
    #[serde(default)]
    checkout_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DodoPayment {
    payment_id: String,
    status: String,
    #[serde(default)]
    metadata: Value,
}

impl DodoPayment {
    fn order_id(&self) -> Option<Uuid> {
        self.metadata
            .get("order_id")
            .and_then(Value::as_str)
            .and_then(|id| id.parse().ok())
    }
}

#[derive(Debug, Deserialize)]
struct DodoWebhook {
    #[serde(rename = "type", default)]
    event_type: Option<String>,
    #[serde(rename = "event_type", default)]
    legacy_event_type: Option<String>,
    #[serde(default)]
    data: Value,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signature::sign_standard_webhook;
    use crate::test_support::sample_order;
    use chrono::Utc;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    // base64 of "secret"
    const SECRET: &str = "whsec_c2VjcmV0";

    fn strategy(base: &str) -> DodoStrategy {
        DodoStrategy::new(DodoConfig::new("dodo_key", SECRET).unwrap().with_api_base_url(base)).unwrap()
    }

    fn signed(payload: &Value) -> (Vec<u8>, WebhookHeaders) {
        let body = serde_json::to_vec(payload).unwrap();
        let now = Utc::now().timestamp();
        let sig = sign_standard_webhook(b"secret", "msg_1", now, &body);
        let headers = WebhookHeaders::new()
            .with("webhook-id", "msg_1")
            .with("webhook-timestamp", now.to_string())
            .with("webhook-signature", sig);
        (body, headers)
    }

    fn return_params(order_id: Uuid, payment_id: Option<&str>, status: &str) -> ReturnParams {
        let mut params = ReturnParams::from([
            ("orderId".to_string(), order_id.to_string()),
            ("status".to_string(), status.to_string()),
        ]);
        if let Some(id) = payment_id {
            params.insert("payment_id".to_string(), id.to_string());
        }
        params
    }

    #[tokio::test]
    async fn test_create_checkout() {
        let server = MockServer::start().await;
        let order = sample_order(PaymentProvider::Dodo);

        Mock::given(method("POST"))
            .and(path("/api/payment-links"))
            .and(header("Authorization", "Bearer dodo_key"))
            .and(body_partial_json(json!({
                "amount": 54_340,
                "metadata": { "order_id": order.id.to_string() }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "pl_123",
                "checkout_url": "https://test.checkout.dodopayments.com/pl_123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let session = strategy(&server.uri())
            .create_checkout(&order, &CheckoutUrls::new("https://api.atelier.shop"))
            .await
            .unwrap();

        assert_eq!(session.session_id, "pl_123");
        assert_eq!(
            session.checkout_url.as_deref(),
            Some("https://test.checkout.dodopayments.com/pl_123")
        );
    }

    #[tokio::test]
    async fn test_create_checkout_without_url_is_provider_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/payment-links"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "pl_9" })))
            .mount(&server)
            .await;

        let err = strategy(&server.uri())
            .create_checkout(&sample_order(PaymentProvider::Dodo), &CheckoutUrls::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::ProviderError { .. }));
    }

    #[tokio::test]
    async fn test_return_trusts_provider_not_query() {
        let server = MockServer::start().await;
        let order_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path("/payments/pay_1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payment_id": "pay_1",
                "status": "failed",
                "metadata": { "order_id": order_id.to_string() }
            })))
            .mount(&server)
            .await;

        let signal = strategy(&server.uri())
            .verify_return(&return_params(order_id, Some("pay_1"), "succeeded"))
            .await
            .unwrap();

        assert_eq!(signal.outcome, PaymentOutcome::Failed);
        assert_eq!(signal.lookup, OrderLookup::OrderId(order_id));
    }

    #[tokio::test]
    async fn test_return_rejects_foreign_payment() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/payments/pay_2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "payment_id": "pay_2",
                "status": "succeeded",
                "metadata": { "order_id": Uuid::new_v4().to_string() }
            })))
            .mount(&server)
            .await;

        let err = strategy(&server.uri())
            .verify_return(&return_params(Uuid::new_v4(), Some("pay_2"), "succeeded"))
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_return_without_payment_id_is_pending() {
        let signal = strategy("http://localhost")
            .verify_return(&return_params(Uuid::new_v4(), None, "succeeded"))
            .await
            .unwrap();
        assert_eq!(signal.outcome, PaymentOutcome::Pending);
    }

    #[tokio::test]
    async fn test_webhook_current_and_legacy_shapes() {
        let order_id = Uuid::new_v4();
        let s = strategy("http://localhost");

        let (body, headers) = signed(&json!({
            "type": "payment.succeeded",
            "data": { "payment_id": "pay_3", "metadata": { "order_id": order_id.to_string() } }
        }));
        let event = s.verify_webhook(&body, &headers).await.unwrap();
        let signal = event.signal.unwrap();
        assert_eq!(signal.outcome, PaymentOutcome::Succeeded);
        assert_eq!(signal.transaction_id.as_deref(), Some("pay_3"));
        assert_eq!(event.event_id, "msg_1");

        let (body, headers) = signed(&json!({
            "event_type": "payment.cancelled",
            "data": { "payload": { "payment_id": "pay_4", "metadata": { "order_id": order_id.to_string() } } }
        }));
        let event = s.verify_webhook(&body, &headers).await.unwrap();
        assert_eq!(event.event_type, WebhookEventType::PaymentCancelled);
        assert_eq!(event.signal.unwrap().lookup, OrderLookup::OrderId(order_id));
    }

    #[tokio::test]
    async fn test_webhook_tampered_body() {
        let (_, headers) = signed(&json!({ "type": "payment.succeeded", "data": {} }));
        let err = strategy("http://localhost")
            .verify_webhook(br#"{"type":"payment.succeeded","data":{"x":1}}"#, &headers)
            .await
            .unwrap_err();
        assert!(matches!(err, ShopError::SignatureInvalid(_)));
    }

    #[test]
    fn test_status_outcome() {
        assert_eq!(status_outcome("succeeded"), PaymentOutcome::Succeeded);
        assert_eq!(status_outcome("cancelled"), PaymentOutcome::Cancelled);
        assert_eq!(status_outcome("processing"), PaymentOutcome::Pending);
    }
}
