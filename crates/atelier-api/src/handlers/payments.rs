//! # Payment Endpoints
//!
//! Checkout creation, the user-facing return legs and provider webhooks.
//! Every path that learns something about a payment hands a
//! [`PaymentSignal`] to the reconciler; none of them touch order state
//! directly.
//!
//! Webhooks answer 200 once the signature has been verified so providers do
//! not retry events we have already seen. Failures after verification are
//! logged; only retryable ones (storage contention) answer 503 so the
//! provider redelivers the event.

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult, ValidJson};
use crate::state::AppState;
use async_trait::async_trait;
use atelier_core::store::OrderStore;
use atelier_core::{
    CheckoutSession, Order, OrderLookup, OrderStatus, PaymentOutcome, PaymentProvider, PaymentReconciler,
    PaymentSignal, PaymentStatus, ReturnParams, ShopError, ShopResult, WebhookEvent, WebhookHeaders,
};
use atelier_pay::{dispatch_webhook_event, WebhookHandler};
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;
use validator::Validate;

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub order_id: Uuid,
}

/// Razorpay Checkout callback, field names as the SDK sends them
#[derive(Debug, Deserialize, Validate)]
pub struct RazorpayVerifyRequest {
    #[validate(length(min = 1))]
    pub razorpay_order_id: String,
    #[validate(length(min = 1))]
    pub razorpay_payment_id: String,
    #[validate(length(min = 1))]
    pub razorpay_signature: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyPaymentResponse {
    pub success: bool,
    pub order: Order,
}

// =============================================================================
// Checkout creation
// =============================================================================

/// One of the caller's orders that can still be paid
async fn payable_order(state: &AppState, user: &AuthUser, order_id: Uuid) -> ApiResult<Order> {
    let order = state
        .store
        .find_order(order_id)
        .await?
        .ok_or_else(|| ShopError::not_found("Order", order_id))?;
    if order.user_id != user.id() {
        return Err(ShopError::Forbidden("Not your order".to_string()).into());
    }
    order.ensure_payable()?;
    Ok(order)
}

/// Create a provider checkout for one of the caller's orders and remember
/// the provider reference on the order.
async fn start_checkout(
    state: &AppState,
    user: &AuthUser,
    provider: PaymentProvider,
    order_id: Uuid,
) -> ApiResult<Json<CheckoutSession>> {
    let order = payable_order(state, user, order_id).await?;

    let strategy = state.strategies.require(provider)?;
    let session = strategy.create_checkout(&order, &state.urls).await.map_err(|e| {
        error!(%order_id, provider = provider.name(), error = %e, "Checkout creation failed");
        e
    })?;
    state.store.set_payment_reference(order.id, &session.session_id).await?;

    info!(
        %order_id,
        provider = provider.name(),
        session_id = %session.session_id,
        "Checkout created"
    );
    Ok(Json(session))
}

#[instrument(skip_all, fields(order_id = %request.order_id))]
pub async fn stripe_checkout(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(request): ValidJson<CheckoutRequest>,
) -> ApiResult<Json<CheckoutSession>> {
    start_checkout(&state, &user, PaymentProvider::Stripe, request.order_id).await
}

/// `POST /api/payments/stripe/intent`: a PaymentIntent the app confirms
/// with the PaymentSheet. The webhook settles the order.
#[instrument(skip_all, fields(order_id = %request.order_id))]
pub async fn stripe_intent(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(request): ValidJson<CheckoutRequest>,
) -> ApiResult<Json<CheckoutSession>> {
    let order = payable_order(&state, &user, request.order_id).await?;

    let strategy = state.strategies.require(PaymentProvider::Stripe)?;
    let intent = strategy.create_payment_intent(&order).await.map_err(|e| {
        error!(order_id = %order.id, error = %e, "Payment intent creation failed");
        e
    })?;
    state.store.set_payment_reference(order.id, &intent.session_id).await?;

    info!(order_id = %order.id, payment_intent = %intent.session_id, "Payment intent created");
    Ok(Json(intent))
}

#[instrument(skip_all, fields(order_id = %request.order_id))]
pub async fn razorpay_order(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(request): ValidJson<CheckoutRequest>,
) -> ApiResult<Json<CheckoutSession>> {
    start_checkout(&state, &user, PaymentProvider::Razorpay, request.order_id).await
}

#[instrument(skip_all, fields(order_id = %request.order_id))]
pub async fn dodo_checkout(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(request): ValidJson<CheckoutRequest>,
) -> ApiResult<Json<CheckoutSession>> {
    start_checkout(&state, &user, PaymentProvider::Dodo, request.order_id).await
}

// =============================================================================
// Return legs
// =============================================================================

async fn lookup_order_id(state: &AppState, lookup: &OrderLookup) -> ShopResult<Option<Uuid>> {
    match lookup {
        OrderLookup::OrderId(id) => Ok(Some(*id)),
        OrderLookup::PaymentReference(reference) => Ok(state
            .store
            .find_order_by_payment_reference(reference)
            .await?
            .map(|o| o.id)),
    }
}

/// Verify the return with the provider and reconcile what it reports.
/// Pending results change nothing.
async fn settle_return(state: &AppState, provider: PaymentProvider, params: &ReturnParams) -> ShopResult<Option<Uuid>> {
    let signal = state.strategies.require(provider)?.verify_return(params).await?;
    if signal.outcome == PaymentOutcome::Pending {
        return lookup_order_id(state, &signal.lookup).await;
    }
    let outcome = state.reconciler.reconcile(&signal).await?;
    Ok(outcome.order().map(|o| o.id))
}

/// Error code of the app deep link for an order that is not paid
fn redirect_error_code(order: &Order) -> &'static str {
    match (order.status, order.payment_status) {
        (OrderStatus::Cancelled, _) => "payment_cancelled",
        (_, PaymentStatus::Failed) => "payment_failed",
        (_, PaymentStatus::Refunded) => "payment_refunded",
        _ => "payment_pending",
    }
}

/// Deep link reflecting the order's state after reconciliation
async fn app_redirect(state: &AppState, order_id: Option<Uuid>) -> Redirect {
    let Some(id) = order_id else {
        return Redirect::to(&state.redirects.error("order_not_found", None));
    };
    let target = match state.store.find_order(id).await {
        Ok(Some(order)) if order.is_paid() => state.redirects.success(id),
        Ok(Some(order)) => state.redirects.error(redirect_error_code(&order), Some(id)),
        Ok(None) => state.redirects.error("order_not_found", None),
        Err(e) => {
            error!(order_id = %id, error = %e, "Loading order for redirect failed");
            state.redirects.error("verification_failed", Some(id))
        }
    };
    Redirect::to(&target)
}

async fn handle_return(state: &AppState, provider: PaymentProvider, params: &ReturnParams) -> Redirect {
    let hinted = params.get("orderId").and_then(|s| s.parse::<Uuid>().ok());
    match settle_return(state, provider, params).await {
        Ok(order_id) => app_redirect(state, order_id.or(hinted)).await,
        Err(e) => {
            warn!(provider = provider.name(), error = %e, "Payment return could not be verified");
            Redirect::to(&state.redirects.error("verification_failed", hinted))
        }
    }
}

/// `GET /api/payments/stripe/return?session_id=..`
#[instrument(skip_all)]
pub async fn stripe_return(State(state): State<AppState>, Query(params): Query<ReturnParams>) -> Redirect {
    handle_return(&state, PaymentProvider::Stripe, &params).await
}

/// `GET /api/payments/stripe/cancel?orderId=..`
///
/// Redirect only. The link is unauthenticated, so the order is left as it
/// is; Stripe cancels it through `checkout.session.expired`.
#[instrument(skip_all)]
pub async fn stripe_cancel(State(state): State<AppState>, Query(params): Query<ReturnParams>) -> Redirect {
    let order_id = params.get("orderId").and_then(|s| s.parse::<Uuid>().ok());
    Redirect::to(&state.redirects.error("payment_cancelled", order_id))
}

/// `GET /api/payments/dodo/return?orderId=..&payment_id=..&status=..`
#[instrument(skip_all)]
pub async fn dodo_return(State(state): State<AppState>, Query(params): Query<ReturnParams>) -> Redirect {
    handle_return(&state, PaymentProvider::Dodo, &params).await
}

/// Razorpay client callback after the in-app checkout completes
#[instrument(skip_all, fields(razorpay_order_id = %request.razorpay_order_id))]
pub async fn razorpay_verify(
    State(state): State<AppState>,
    user: AuthUser,
    ValidJson(request): ValidJson<RazorpayVerifyRequest>,
) -> ApiResult<Json<VerifyPaymentResponse>> {
    let order = state
        .store
        .find_order_by_payment_reference(&request.razorpay_order_id)
        .await?
        .ok_or_else(|| ShopError::not_found("Order", &request.razorpay_order_id))?;
    if order.user_id != user.id() {
        return Err(ShopError::Forbidden("Not your order".to_string()).into());
    }

    let params = ReturnParams::from([
        ("razorpay_order_id".to_string(), request.razorpay_order_id),
        ("razorpay_payment_id".to_string(), request.razorpay_payment_id),
        ("razorpay_signature".to_string(), request.razorpay_signature),
    ]);
    let signal = state
        .strategies
        .require(PaymentProvider::Razorpay)?
        .verify_return(&params)
        .await?;
    state.reconciler.reconcile(&signal).await?;

    let order = state
        .store
        .find_order(order.id)
        .await?
        .ok_or_else(|| ShopError::not_found("Order", order.id))?;
    Ok(Json(VerifyPaymentResponse {
        success: order.is_paid(),
        order,
    }))
}

// =============================================================================
// Webhooks
// =============================================================================

/// Feeds verified webhook events into the reconciler
pub struct ReconcilingHandler {
    reconciler: PaymentReconciler,
}

impl ReconcilingHandler {
    pub fn new(reconciler: PaymentReconciler) -> Self {
        Self { reconciler }
    }

    async fn apply(&self, event: &WebhookEvent, signal: &PaymentSignal) -> ShopResult<()> {
        let signal = signal.clone().with_event_id(event.event_id.clone());
        self.reconciler.reconcile(&signal).await.map(|_| ())
    }
}

#[async_trait]
impl WebhookHandler for ReconcilingHandler {
    async fn on_payment_succeeded(&self, event: &WebhookEvent, signal: &PaymentSignal) -> ShopResult<()> {
        self.apply(event, signal).await
    }

    async fn on_payment_failed(&self, event: &WebhookEvent, signal: &PaymentSignal) -> ShopResult<()> {
        self.apply(event, signal).await
    }

    async fn on_payment_cancelled(&self, event: &WebhookEvent, signal: &PaymentSignal) -> ShopResult<()> {
        self.apply(event, signal).await
    }
}

fn webhook_headers(headers: &HeaderMap) -> WebhookHeaders {
    let mut out = WebhookHeaders::new();
    for (name, value) in headers {
        if let Ok(value) = value.to_str() {
            out.insert(name.as_str(), value);
        }
    }
    out
}

async fn receive_webhook(state: &AppState, provider: PaymentProvider, headers: &HeaderMap, body: &[u8]) -> Response {
    let strategy = match state.strategies.require(provider) {
        Ok(s) => s,
        Err(e) => return ApiError::from(e).into_response(),
    };

    let event = match strategy.verify_webhook(body, &webhook_headers(headers)).await {
        Ok(event) => event,
        Err(e) => {
            warn!(provider = provider.name(), error = %e, "Webhook rejected");
            return ApiError::from(e).into_response();
        }
    };

    info!(
        provider = provider.name(),
        event_id = %event.event_id,
        event = %event.raw_type,
        "Webhook received"
    );

    let handler = ReconcilingHandler::new(state.reconciler.clone());
    if let Err(e) = dispatch_webhook_event(&handler, &event).await {
        error!(
            provider = provider.name(),
            event_id = %event.event_id,
            error = %e,
            "Webhook processing failed after verification"
        );
        if e.is_retryable() {
            return ApiError::from(e).into_response();
        }
    }

    (StatusCode::OK, Json(json!({ "received": true }))).into_response()
}

#[instrument(skip_all)]
pub async fn stripe_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    receive_webhook(&state, PaymentProvider::Stripe, &headers, &body).await
}

#[instrument(skip_all)]
pub async fn razorpay_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    receive_webhook(&state, PaymentProvider::Razorpay, &headers, &body).await
}

#[instrument(skip_all)]
pub async fn dodo_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    receive_webhook(&state, PaymentProvider::Dodo, &headers, &body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_webhook_headers_lowercased() {
        let mut headers = HeaderMap::new();
        headers.insert("Stripe-Signature", HeaderValue::from_static("t=1,v1=abc"));
        let out = webhook_headers(&headers);
        assert_eq!(out.get("stripe-signature"), Some("t=1,v1=abc"));
    }
}
