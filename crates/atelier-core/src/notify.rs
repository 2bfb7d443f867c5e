//! # Push Notifications
//!
//! Delivery seam for device push. Implementations live in the API crate
//! (FCM or log-only); the domain only builds messages.

use crate::error::ShopResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

/// A push message addressed to all devices of one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl PushMessage {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            data: BTreeMap::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Sent to the buyer once a payment has been confirmed
    pub fn order_confirmed(order_id: Uuid, order_number: &str) -> Self {
        Self::new(
            "Order Confirmed",
            format!("Your order {order_number} has been confirmed and will be shipped soon."),
        )
        .with_data("type", "order_status")
        .with_data("orderId", order_id.to_string())
    }

    /// Sent to the owner after an admin status change
    pub fn order_update(order_id: Uuid, body: impl Into<String>) -> Self {
        Self::new("Order Update", body)
            .with_data("type", "order_status")
            .with_data("orderId", order_id.to_string())
    }
}

/// Per-call delivery summary
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushReport {
    pub sent: usize,
    pub failed: usize,
    /// Tokens deleted because the push service reported them permanently invalid
    pub pruned: usize,
}

#[async_trait]
pub trait PushNotifier: Send + Sync {
    async fn send_to_user(&self, user_id: Uuid, message: &PushMessage) -> ShopResult<PushReport>;

    fn name(&self) -> &'static str;
}

pub type BoxedPushNotifier = Arc<dyn PushNotifier>;
