//! # atelier-pay
//!
//! Payment strategies for the atelier storefront.
//!
//! 1. **StripeCheckoutStrategy** - hosted Checkout Sessions
//! 2. **RazorpayStrategy** - Razorpay orders, verified client callback
//! 3. **DodoStrategy** - Dodo payment links, Standard Webhooks
//!
//! A strategy is registered only when its environment is configured:
//!
//! ```rust,ignore
//! use atelier_pay::{configured_strategies, StripeCheckoutStrategy};
//!
//! let selector = configured_strategies(Currency::USD);
//! let session = selector
//!     .require(PaymentProvider::Stripe)?
//!     .create_checkout(&order, &urls)
//!     .await?;
//! // Redirect the customer to session.checkout_url
//! ```
//!
//! ## Webhook Handling
//!
//! ```rust,ignore
//! let event = strategy.verify_webhook(&body, &headers).await?;
//! dispatch_webhook_event(&handler, &event).await?;
//! ```

pub mod config;
pub mod dodo;
mod http;
pub mod razorpay;
pub mod signature;
pub mod stripe;
pub mod webhook;

#[cfg(test)]
mod test_support;

use atelier_core::{BoxedPaymentStrategy, Currency, PaymentStrategySelector};
use std::sync::Arc;
use tracing::{info, warn};

// Re-exports
pub use config::{DodoConfig, RazorpayConfig, StripeConfig};
pub use dodo::DodoStrategy;
pub use razorpay::RazorpayStrategy;
pub use stripe::StripeCheckoutStrategy;
pub use webhook::{dispatch_webhook_event, WebhookHandler};

/// Register a strategy, logging the webhook events its dashboard must send
fn enable(selector: &mut PaymentStrategySelector, strategy: BoxedPaymentStrategy) {
    info!(
        provider = strategy.provider_name(),
        webhook_events = ?strategy.handled_events(),
        "Payments enabled"
    );
    selector.register(strategy);
}

/// Register every provider whose environment variables are present.
/// Providers that fail to configure are logged and skipped.
pub fn configured_strategies(store_currency: Currency) -> PaymentStrategySelector {
    let mut selector = PaymentStrategySelector::new();

    match StripeCheckoutStrategy::from_env(store_currency) {
        Ok(s) => {
            info!(test_mode = s.config().is_test_mode(), "Stripe configured");
            enable(&mut selector, Arc::new(s));
        }
        Err(e) => warn!(error = %e, "Stripe payments disabled"),
    }

    match RazorpayStrategy::from_env() {
        Ok(s) => enable(&mut selector, Arc::new(s)),
        Err(e) => warn!(error = %e, "Razorpay payments disabled"),
    }

    match DodoStrategy::from_env(store_currency) {
        Ok(s) => enable(&mut selector, Arc::new(s)),
        Err(e) => warn!(error = %e, "Dodo payments disabled"),
    }

    selector
}

#[cfg(test)]
mod tests {
    use super::*;
    use atelier_core::{PaymentProvider, PaymentStrategy};

    #[test]
    fn test_enable_registers_strategy() {
        let stripe = StripeCheckoutStrategy::new(StripeConfig::new("sk_test_123", "whsec_test")).unwrap();
        assert!(stripe.handled_events().contains(&"payment_intent.succeeded"));

        let mut selector = PaymentStrategySelector::new();
        enable(&mut selector, Arc::new(stripe));
        assert!(selector.has_provider(PaymentProvider::Stripe));
        assert!(!selector.has_provider(PaymentProvider::Dodo));
    }
}
