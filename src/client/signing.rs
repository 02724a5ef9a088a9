//! HMAC-SHA256 request signing for the partner API.
//!
//! Every request carries the dealer's app key, a millisecond timestamp and a
//! lowercase hex signature over `app_key + timestamp + body`, computed with
//! the dealer's secret.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the dealer app key.
pub const HEADER_APP_KEY: &str = "appKey";
/// Header carrying the request timestamp in milliseconds.
pub const HEADER_TIMESTAMP: &str = "timestamp";
/// Header carrying the hex-encoded signature.
pub const HEADER_SIGN: &str = "sign";

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("invalid signing secret")]
    InvalidSecret,
}

/// Computes the request signature for the given key, secret, timestamp and body.
pub fn sign_request(
    app_key: &str,
    app_secret: &str,
    timestamp_ms: i64,
    body: &str,
) -> Result<String, SigningError> {
    let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes())
        .map_err(|_| SigningError::InvalidSecret)?;
    mac.update(app_key.as_bytes());
    mac.update(timestamp_ms.to_string().as_bytes());
    mac.update(body.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic() {
        let a = sign_request("key", "secret", 1_700_000_000_000, "{}").unwrap();
        let b = sign_request("key", "secret", 1_700_000_000_000, "{}").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_varies_with_inputs() {
        let base = sign_request("key", "secret", 1_700_000_000_000, "{}").unwrap();
        assert_ne!(
            base,
            sign_request("key", "secret", 1_700_000_000_001, "{}").unwrap()
        );
        assert_ne!(
            base,
            sign_request("key", "other", 1_700_000_000_000, "{}").unwrap()
        );
        assert_ne!(
            base,
            sign_request("key", "secret", 1_700_000_000_000, "{\"a\":1}").unwrap()
        );
    }
}
