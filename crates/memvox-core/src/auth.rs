//! Webhook signature verification (HMAC-SHA256 with replay window).
//!
//! The voice platform signs every webhook with a header of the form
//! `t=<unix_ts>,v0=<hex hmac>`, where the digest is HMAC-SHA256 over
//! `"{t}.{body}"` with the shared secret. Verification is constant-time
//! via the hmac crate's `verify_slice`, and timestamps outside the
//! replay window are rejected even with a correct digest -- a leaked
//! signature is only worth its window.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use memvox_types::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Verify a signed webhook request.
///
/// # Arguments
/// - `secret`: the shared webhook secret
/// - `body`: the raw request body bytes
/// - `header`: the `signature` header value, if present
/// - `tolerance_secs`: maximum accepted clock skew in either direction
/// - `now_unix`: current unix time (injected for testability)
///
/// No side effects; failure modes map to the [`AuthError`] variants.
pub fn verify_signature(
    secret: &str,
    body: &[u8],
    header: Option<&str>,
    tolerance_secs: i64,
    now_unix: i64,
) -> Result<(), AuthError> {
    let header = header.ok_or(AuthError::MissingHeader)?;
    let (timestamp, digest_hex) = parse_signature_header(header)?;

    // Replay window: reject before touching the digest. The window is
    // symmetric to tolerate minor clock skew in the future direction.
    let age_secs = now_unix - timestamp;
    if age_secs > tolerance_secs || age_secs < -tolerance_secs {
        return Err(AuthError::StaleTimestamp { age_secs });
    }

    let expected = hex_decode(&digest_hex).map_err(|_| AuthError::SignatureMismatch)?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AuthError::MalformedHeader(e.to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);

    // Constant-time verification (via hmac crate's `verify_slice`)
    mac.verify_slice(&expected)
        .map_err(|_| AuthError::SignatureMismatch)
}

/// Produce a valid `signature` header for a payload.
///
/// Used by tests and operator tooling to generate signed requests.
pub fn sign_payload(secret: &str, body: &[u8], timestamp: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    let digest = mac.finalize().into_bytes();
    format!("t={timestamp},v0={}", hex_encode(&digest))
}

/// Parse a `t=<ts>,v0=<hex>` header into its parts.
fn parse_signature_header(header: &str) -> Result<(i64, String), AuthError> {
    let mut parts = header.splitn(2, ',');
    let timestamp_part = parts
        .next()
        .ok_or_else(|| AuthError::MalformedHeader(header.to_string()))?;
    let digest_part = parts
        .next()
        .ok_or_else(|| AuthError::MalformedHeader(header.to_string()))?;

    let timestamp_str = timestamp_part
        .strip_prefix("t=")
        .ok_or_else(|| AuthError::MalformedHeader(header.to_string()))?;
    let digest_hex = digest_part
        .strip_prefix("v0=")
        .ok_or_else(|| AuthError::MalformedHeader(header.to_string()))?;

    let timestamp: i64 = timestamp_str
        .parse()
        .map_err(|_| AuthError::InvalidTimestamp(timestamp_str.to_string()))?;

    Ok((timestamp, digest_hex.trim().to_string()))
}

/// Decode a hex string to bytes.
fn hex_decode(hex: &str) -> Result<Vec<u8>, ()> {
    if hex.len() % 2 != 0 {
        return Err(());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

/// Encode bytes to a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
