//! Stripe webhook signature verification.
//!
//! The `Stripe-Signature` header carries `t=<unix seconds>,v1=<hex>`
//! where the digest is HMAC-SHA256 over `"{t}.{payload}"`. Verification
//! is only enforced when a webhook secret is configured; without one
//! the gateway accepts simulated events for demo use.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

/// Tolerated clock skew between the signature timestamp and now.
const MAX_TIMESTAMP_SKEW_SECONDS: u64 = 300;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookSignatureError {
    #[error("signature header is missing the '{0}' element")]
    MissingElement(&'static str),
    #[error("invalid signature timestamp '{0}'")]
    InvalidTimestamp(String),
    #[error("signature timestamp skew {0}s exceeds {MAX_TIMESTAMP_SKEW_SECONDS}s")]
    TimestampSkew(u64),
    #[error("invalid hex digest in signature")]
    InvalidDigest,
    #[error("signature verification failed")]
    Mismatch,
}

/// Verifies a Stripe `v1` signature over the raw payload. `now_unix`
/// is a parameter so tests inject time.
pub fn verify_stripe_signature(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    now_unix: u64,
) -> Result<(), WebhookSignatureError> {
    let mut timestamp: Option<&str> = None;
    let mut digest_hex: Option<&str> = None;
    for element in signature_header.split(',') {
        match element.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => digest_hex = Some(value),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(WebhookSignatureError::MissingElement("t"))?;
    let digest_hex = digest_hex.ok_or(WebhookSignatureError::MissingElement("v1"))?;

    let timestamp_seconds = timestamp
        .parse::<u64>()
        .map_err(|_| WebhookSignatureError::InvalidTimestamp(timestamp.to_string()))?;
    let skew = now_unix.abs_diff(timestamp_seconds);
    if skew > MAX_TIMESTAMP_SKEW_SECONDS {
        return Err(WebhookSignatureError::TimestampSkew(skew));
    }

    let signature_bytes = decode_hex(digest_hex)?;
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| WebhookSignatureError::Mismatch)?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    mac.verify_slice(&signature_bytes)
        .map_err(|_| WebhookSignatureError::Mismatch)
}

fn decode_hex(value: &str) -> Result<Vec<u8>, WebhookSignatureError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed.len() % 2 != 0 {
        return Err(WebhookSignatureError::InvalidDigest);
    }
    let raw = trimmed.as_bytes();
    let mut bytes = Vec::with_capacity(trimmed.len() / 2);
    let mut index = 0usize;
    while index < raw.len() {
        let hex = std::str::from_utf8(&raw[index..index + 2])
            .map_err(|_| WebhookSignatureError::InvalidDigest)?;
        let byte =
            u8::from_str_radix(hex, 16).map_err(|_| WebhookSignatureError::InvalidDigest)?;
        bytes.push(byte);
        index += 2;
    }
    Ok(bytes)
}

#[cfg(test)]
pub(crate) fn sign_stripe_payload(payload: &[u8], secret: &str, timestamp: u64) -> String {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let digest = mac.finalize().into_bytes();
    let digest_hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
    format!("t={timestamp},v1={digest_hex}")
}
