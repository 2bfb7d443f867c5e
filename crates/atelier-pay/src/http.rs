//! Shared HTTP plumbing for provider API calls.

use atelier_core::{PaymentProvider, ShopError, ShopResult};
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tracing::error;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub(crate) fn http_client() -> ShopResult<Client> {
    Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()
        .map_err(|e| ShopError::Configuration(format!("failed to build HTTP client: {e}")))
}

/// Pull the human-readable message out of a provider error body
fn provider_message(provider: PaymentProvider, body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let message = match provider {
        PaymentProvider::Stripe => value.pointer("/error/message"),
        PaymentProvider::Razorpay => value.pointer("/error/description"),
        PaymentProvider::Dodo => value.get("message"),
    };
    message.and_then(Value::as_str).map(String::from)
}

/// Send a request and decode a 2xx JSON body
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: PaymentProvider,
    request: RequestBuilder,
) -> ShopResult<T> {
    let response = request
        .send()
        .await
        .map_err(|e| ShopError::NetworkError(e.to_string()))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| ShopError::NetworkError(e.to_string()))?;

    if !status.is_success() {
        error!(provider = provider.name(), %status, body = %body, "Provider API error");
        let message = provider_message(provider, &body).unwrap_or_else(|| format!("HTTP {status}: {body}"));
        return Err(ShopError::ProviderError {
            provider: provider.name().to_string(),
            message,
        });
    }

    serde_json::from_str(&body).map_err(|e| {
        ShopError::Serialization(format!(
            "Failed to parse {} response: {e}",
            provider.display_name()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_message() {
        assert_eq!(
            provider_message(PaymentProvider::Stripe, r#"{"error":{"message":"No such session"}}"#),
            Some("No such session".to_string())
        );
        assert_eq!(
            provider_message(
                PaymentProvider::Razorpay,
                r#"{"error":{"code":"BAD_REQUEST_ERROR","description":"amount too small"}}"#
            ),
            Some("amount too small".to_string())
        );
        assert_eq!(
            provider_message(PaymentProvider::Dodo, r#"{"message":"invalid currency"}"#),
            Some("invalid currency".to_string())
        );
        assert_eq!(provider_message(PaymentProvider::Dodo, "<html>"), None);
    }
}
