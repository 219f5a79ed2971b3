//! Slack request signing (`v0` scheme).

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Oldest request timestamp accepted, in seconds.
pub const MAX_SKEW_SECONDS: u64 = 5 * 60;

/// Compute the `v0=` signature for a request body.
///
/// # Errors
///
/// Returns `AppError::Config` if the secret cannot key the MAC.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| AppError::Config(format!("invalid signing secret: {err}")))?;
    mac.update(format!("v0:{timestamp}:").as_bytes());
    mac.update(body);
    Ok(format!("v0={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verify `X-Slack-Signature` and `X-Slack-Request-Timestamp`.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` if the timestamp is stale or
/// malformed, or if the signature does not match.
pub fn verify(
    secret: &str,
    timestamp: Option<&str>,
    signature: Option<&str>,
    body: &[u8],
    now: DateTime<Utc>,
) -> Result<()> {
    let timestamp = timestamp.ok_or_else(|| AppError::Unauthorized("missing timestamp".into()))?;
    let signature = signature.ok_or_else(|| AppError::Unauthorized("missing signature".into()))?;

    let sent: i64 = timestamp
        .trim()
        .parse()
        .map_err(|_| AppError::Unauthorized("malformed timestamp".into()))?;
    if now.timestamp().abs_diff(sent) > MAX_SKEW_SECONDS {
        return Err(AppError::Unauthorized("stale request".into()));
    }

    let provided = signature
        .strip_prefix("v0=")
        .and_then(|hex_sig| hex::decode(hex_sig).ok())
        .ok_or_else(|| AppError::Unauthorized("malformed signature".into()))?;

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| AppError::Config(format!("invalid signing secret: {err}")))?;
    mac.update(format!("v0:{timestamp}:").as_bytes());
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| AppError::Unauthorized("signature mismatch".into()))
}
