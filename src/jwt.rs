//! Unverified ID-token payload decoding.
//!
//! Claims are read for display purposes only; no signature verification
//! happens here.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::AuthError;

/// Decode the claims object from a JWT's payload segment.
pub fn decode_payload(token: &str) -> Result<serde_json::Value, AuthError> {
    let payload = token
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::Invalid("id token is not a three-segment jwt".to_string()))?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|err| AuthError::Invalid(format!("invalid base64 in id token payload: {err}")))?;
    serde_json::from_slice(&bytes)
        .map_err(|err| AuthError::Invalid(format!("invalid json in id token payload: {err}")))
}
