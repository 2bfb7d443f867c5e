//! # Push Delivery
//!
//! [`FcmNotifier`] sends through the FCM HTTP v1 API and deletes tokens the
//! service reports as permanently invalid. [`LoggingNotifier`] is used when
//! FCM is not configured.

use crate::config::FcmConfig;
use async_trait::async_trait;
use atelier_core::{PushMessage, PushNotifier, PushReport, SharedStore, ShopError, ShopResult};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

const FCM_API_BASE: &str = "https://fcm.googleapis.com";

/// Error codes after which a token will never work again
const PERMANENT_FAILURES: [&str; 2] = ["UNREGISTERED", "INVALID_ARGUMENT"];

/// Logs messages instead of delivering them
pub struct LoggingNotifier {
    store: SharedStore,
}

impl LoggingNotifier {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }
}

#[async_trait]
impl PushNotifier for LoggingNotifier {
    async fn send_to_user(&self, user_id: Uuid, message: &PushMessage) -> ShopResult<PushReport> {
        let tokens = self.store.device_tokens(user_id).await?;
        info!(%user_id, devices = tokens.len(), title = %message.title, body = %message.body, "Push (log only)");
        Ok(PushReport::default())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

#[derive(Debug, Default, Deserialize)]
struct FcmErrorBody {
    #[serde(default)]
    error: FcmError,
}

#[derive(Debug, Default, Deserialize)]
struct FcmError {
    #[serde(default)]
    status: String,
    #[serde(default)]
    details: Vec<FcmErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct FcmErrorDetail {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

impl FcmError {
    fn is_permanent(&self) -> bool {
        PERMANENT_FAILURES.contains(&self.status.as_str())
            || self
                .details
                .iter()
                .filter_map(|d| d.error_code.as_deref())
                .any(|c| PERMANENT_FAILURES.contains(&c))
    }
}

enum Delivery {
    Sent,
    Failed,
    Stale,
}

/// Firebase Cloud Messaging (HTTP v1)
pub struct FcmNotifier {
    store: SharedStore,
    client: reqwest::Client,
    config: FcmConfig,
    api_base: String,
}

impl FcmNotifier {
    pub fn new(store: SharedStore, config: FcmConfig) -> ShopResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| ShopError::Configuration(format!("FCM client: {e}")))?;
        Ok(Self {
            store,
            client,
            config,
            api_base: FCM_API_BASE.to_string(),
        })
    }

    /// Point at a different API host (tests)
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    async fn deliver(&self, token: &str, message: &PushMessage) -> Delivery {
        let url = format!(
            "{}/v1/projects/{}/messages:send",
            self.api_base, self.config.project_id
        );
        let body = json!({
            "message": {
                "token": token,
                "notification": { "title": message.title, "body": message.body },
                "data": message.data,
            }
        });

        let response = match self
            .client
            .post(&url)
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "FCM request failed");
                return Delivery::Failed;
            }
        };

        if response.status().is_success() {
            return Delivery::Sent;
        }

        let status = response.status();
        let error = response.json::<FcmErrorBody>().await.unwrap_or_default().error;
        if error.is_permanent() {
            debug!(%status, "FCM rejected token permanently");
            Delivery::Stale
        } else {
            warn!(%status, fcm_status = %error.status, "FCM delivery failed");
            Delivery::Failed
        }
    }
}

#[async_trait]
impl PushNotifier for FcmNotifier {
    #[instrument(skip(self, message), fields(title = %message.title))]
    async fn send_to_user(&self, user_id: Uuid, message: &PushMessage) -> ShopResult<PushReport> {
        let tokens = self.store.device_tokens(user_id).await?;
        let mut report = PushReport::default();
        let mut stale = Vec::new();

        for token in tokens {
            match self.deliver(&token, message).await {
                Delivery::Sent => report.sent += 1,
                Delivery::Failed => report.failed += 1,
                Delivery::Stale => {
                    report.failed += 1;
                    stale.push(token);
                }
            }
        }

        if !stale.is_empty() {
            report.pruned = self.store.remove_device_tokens(&stale).await? as usize;
            info!(pruned = report.pruned, "Removed invalid device tokens");
        }
        Ok(report)
    }

    fn name(&self) -> &'static str {
        "fcm"
    }
}
