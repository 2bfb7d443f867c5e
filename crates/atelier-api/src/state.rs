//! # Application State
//!
//! Shared state for the Axum application: storage, the payment reconciler
//! and strategies, token keys and the push notifier.

use crate::auth::TokenKeys;
use crate::config::AppConfig;
use atelier_core::store::PaymentStore;
use atelier_core::{
    AppRedirects, BoxedPushNotifier, CheckoutUrls, PaymentReconciler, PaymentStrategySelector, SharedStore, Store,
};
use std::sync::Arc;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: SharedStore,
    pub reconciler: PaymentReconciler,
    /// Configured payment providers
    pub strategies: PaymentStrategySelector,
    /// Provider return and webhook URLs
    pub urls: CheckoutUrls,
    /// Deep links back into the app
    pub redirects: AppRedirects,
    pub tokens: Arc<TokenKeys>,
    pub notifier: BoxedPushNotifier,
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Assemble state around a concrete store.
    ///
    /// The store is shared by the handlers and the reconciler, so it is
    /// taken concretely and coerced to both trait objects.
    pub fn build<S: Store + 'static>(
        config: AppConfig,
        store: Arc<S>,
        strategies: PaymentStrategySelector,
        notifier: BoxedPushNotifier,
    ) -> Self {
        let payments: Arc<dyn PaymentStore> = store.clone();
        let shared: SharedStore = store;

        let tokens = TokenKeys::new(
            &config.jwt_secret,
            &config.jwt_refresh_secret,
            config.access_token_ttl_secs,
            config.refresh_token_ttl_secs,
        );

        Self {
            store: shared,
            reconciler: PaymentReconciler::new(payments, notifier.clone()),
            strategies,
            urls: CheckoutUrls::new(&config.base_url),
            redirects: AppRedirects::new(&config.app_deep_link_base),
            tokens: Arc::new(tokens),
            notifier,
            config: Arc::new(config),
        }
    }

    /// Public URL of a file under the upload directory
    pub fn upload_url(&self, relative: &str) -> String {
        format!("{}/uploads/{}", self.urls.base_url, relative.trim_start_matches('/'))
    }
}
