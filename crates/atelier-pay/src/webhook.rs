//! # Webhook Dispatch
//!
//! Routes verified webhook events to handler methods. The API implements
//! [`WebhookHandler`] on top of the payment reconciler and keeps the logging
//! defaults for pending and unknown events.

use async_trait::async_trait;
use atelier_core::{PaymentSignal, ShopResult, WebhookEvent, WebhookEventType};
use tracing::{debug, info, warn};

/// Webhook event handler trait
///
/// Implement the methods for the events you act on.
#[async_trait]
#[allow(unused_variables)]
pub trait WebhookHandler: Send + Sync {
    async fn on_payment_succeeded(&self, event: &WebhookEvent, signal: &PaymentSignal) -> ShopResult<()> {
        info!(provider = event.provider.name(), event_id = %event.event_id, lookup = %signal.lookup, "Payment succeeded");
        Ok(())
    }

    async fn on_payment_failed(&self, event: &WebhookEvent, signal: &PaymentSignal) -> ShopResult<()> {
        warn!(provider = event.provider.name(), event_id = %event.event_id, lookup = %signal.lookup, "Payment failed");
        Ok(())
    }

    async fn on_payment_cancelled(&self, event: &WebhookEvent, signal: &PaymentSignal) -> ShopResult<()> {
        info!(provider = event.provider.name(), event_id = %event.event_id, lookup = %signal.lookup, "Payment cancelled");
        Ok(())
    }

    /// Known event that does not settle the payment yet
    async fn on_payment_pending(&self, event: &WebhookEvent) -> ShopResult<()> {
        debug!(provider = event.provider.name(), event = %event.raw_type, "Payment still pending");
        Ok(())
    }

    /// Unknown events, and known ones that could not be tied to an order
    async fn on_unknown_event(&self, event: &WebhookEvent) -> ShopResult<()> {
        debug!(provider = event.provider.name(), event = %event.raw_type, "Unhandled webhook event");
        Ok(())
    }
}

/// Dispatch a webhook event to the appropriate handler method
pub async fn dispatch_webhook_event(handler: &dyn WebhookHandler, event: &WebhookEvent) -> ShopResult<()> {
    match (&event.event_type, &event.signal) {
        (WebhookEventType::PaymentSucceeded, Some(signal)) => handler.on_payment_succeeded(event, signal).await,
        (WebhookEventType::PaymentFailed, Some(signal)) => handler.on_payment_failed(event, signal).await,
        (WebhookEventType::PaymentCancelled, Some(signal)) => handler.on_payment_cancelled(event, signal).await,
        (WebhookEventType::PaymentPending, _) => handler.on_payment_pending(event).await,
        _ => handler.on_unknown_event(event).await,
    }
}
