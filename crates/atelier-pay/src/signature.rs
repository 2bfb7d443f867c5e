//! # Webhook Signature Verification
//!
//! HMAC-SHA256 helpers shared by the providers. Comparisons go through
//! `Mac::verify_slice`, which is constant time.

use atelier_core::{ShopError, ShopResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Maximum clock skew accepted for timestamped signatures
pub const TIMESTAMP_TOLERANCE_SECS: i64 = 300;

fn mac_over(key: &[u8], parts: &[&[u8]]) -> HmacSha256 {
    // HMAC accepts keys of any length, so this cannot fail
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC accepts keys of any size"),
    };
    for part in parts {
        mac.update(part);
    }
    mac
}

/// Hex HMAC-SHA256 of the concatenated parts
pub fn hmac_sha256_hex(key: &[u8], parts: &[&[u8]]) -> String {
    hex::encode(mac_over(key, parts).finalize().into_bytes())
}

/// Base64 HMAC-SHA256 of the concatenated parts
pub fn hmac_sha256_base64(key: &[u8], parts: &[&[u8]]) -> String {
    BASE64.encode(mac_over(key, parts).finalize().into_bytes())
}

/// Check a hex-encoded signature
pub fn verify_hex(key: &[u8], parts: &[&[u8]], signature_hex: &str) -> bool {
    match hex::decode(signature_hex.trim()) {
        Ok(sig) => mac_over(key, parts).verify_slice(&sig).is_ok(),
        Err(_) => false,
    }
}

/// Check a base64-encoded signature
pub fn verify_base64(key: &[u8], parts: &[&[u8]], signature_b64: &str) -> bool {
    match BASE64.decode(signature_b64.trim()) {
        Ok(sig) => mac_over(key, parts).verify_slice(&sig).is_ok(),
        Err(_) => false,
    }
}

/// The timestamp is attacker-controlled and checked before the signature
fn check_timestamp(timestamp: i64) -> ShopResult<()> {
    let skew = Utc::now().timestamp().checked_sub(timestamp).map(i64::unsigned_abs);
    match skew {
        Some(secs) if secs <= TIMESTAMP_TOLERANCE_SECS.unsigned_abs() => Ok(()),
        _ => Err(ShopError::SignatureInvalid(
            "Timestamp outside tolerance".to_string(),
        )),
    }
}

// =============================================================================
// Stripe-Signature: t=<unix>,v1=<hex>[,v1=<hex>]
// =============================================================================

#[derive(Debug)]
pub struct StripeSignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

pub fn parse_stripe_signature(header: &str) -> ShopResult<StripeSignatureHeader> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        ShopError::SignatureInvalid("Missing timestamp in signature".to_string())
    })?;

    if signatures.is_empty() {
        return Err(ShopError::SignatureInvalid(
            "No v1 signature found".to_string(),
        ));
    }

    Ok(StripeSignatureHeader {
        timestamp,
        signatures,
    })
}

/// Verify a `Stripe-Signature` header over the raw body
pub fn verify_stripe_signature(secret: &str, payload: &[u8], header: &str) -> ShopResult<()> {
    let parsed = parse_stripe_signature(header)?;
    check_timestamp(parsed.timestamp)?;

    let ts = parsed.timestamp.to_string();
    let parts: [&[u8]; 3] = [ts.as_bytes(), b".", payload];
    if parsed
        .signatures
        .iter()
        .any(|sig| verify_hex(secret.as_bytes(), &parts, sig))
    {
        Ok(())
    } else {
        Err(ShopError::SignatureInvalid("Signature mismatch".to_string()))
    }
}

/// Build a header value the way Stripe does (tests and local tooling)
pub fn sign_stripe_payload(secret: &str, payload: &[u8], timestamp: i64) -> String {
    let ts = timestamp.to_string();
    let sig = hmac_sha256_hex(secret.as_bytes(), &[ts.as_bytes(), b".", payload]);
    format!("t={ts},v1={sig}")
}

// =============================================================================
// Standard Webhooks: webhook-id / webhook-timestamp / webhook-signature
// =============================================================================

/// Decode a Standard Webhooks secret, with or without the `whsec_` prefix
pub fn decode_standard_webhook_secret(secret: &str) -> ShopResult<Vec<u8>> {
    let encoded = secret.trim().strip_prefix("whsec_").unwrap_or(secret.trim());
    BASE64
        .decode(encoded)
        .map_err(|e| ShopError::Configuration(format!("webhook secret is not valid base64: {e}")))
}

/// Verify `webhook-signature` (space-separated `v1,<base64>` entries) over
/// `"{id}.{timestamp}.{body}"`
pub fn verify_standard_webhook(
    key: &[u8],
    webhook_id: &str,
    timestamp: &str,
    payload: &[u8],
    signature_header: &str,
) -> ShopResult<()> {
    let ts: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| ShopError::SignatureInvalid("Invalid webhook-timestamp".to_string()))?;
    check_timestamp(ts)?;

    let parts: [&[u8]; 5] = [webhook_id.as_bytes(), b".", timestamp.trim().as_bytes(), b".", payload];
    let valid = signature_header
        .split_whitespace()
        .filter_map(|entry| entry.split_once(','))
        .filter(|(version, _)| *version == "v1")
        .any(|(_, sig)| verify_base64(key, &parts, sig));

    if valid {
        Ok(())
    } else {
        Err(ShopError::SignatureInvalid("Signature mismatch".to_string()))
    }
}

/// Build a `webhook-signature` value (tests and local tooling)
pub fn sign_standard_webhook(key: &[u8], webhook_id: &str, timestamp: i64, payload: &[u8]) -> String {
    let ts = timestamp.to_string();
    let sig = hmac_sha256_base64(key, &[webhook_id.as_bytes(), b".", ts.as_bytes(), b".", payload]);
    format!("v1,{sig}")
}
