//! Token record model and wire-response decoding.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::AuthError;
use crate::jwt;

/// Persisted token record; the single source of truth for session validity.
///
/// `expires_at` (unix milliseconds) is derived exactly once at receipt from
/// `expires_in` plus the configured refresh slack, and is the only field
/// expiry decisions consult afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    #[serde(default)]
    pub id_token: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenRecord {
    /// Build a record from a token endpoint response.
    ///
    /// `previous_refresh` is carried forward when the provider does not
    /// rotate the refresh token; its absence in the response is not an error.
    pub fn from_response(
        response: TokenResponse,
        previous_refresh: Option<&str>,
        refresh_slack_secs: i64,
    ) -> Self {
        let expires_at = response.expires_in.map(|secs| {
            unix_now_ms().saturating_add(secs.saturating_add(refresh_slack_secs).saturating_mul(1000))
        });
        Self {
            id_token: response.id_token,
            access_token: response.access_token,
            refresh_token: response
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_string)),
            expires_in: response.expires_in,
            expires_at,
            token_type: response.token_type,
        }
    }

    /// Decode the ID token's claims, failing when no ID token was issued.
    pub fn id_token_claims(&self) -> Result<serde_json::Value, AuthError> {
        let id_token = self.id_token.as_deref().ok_or(AuthError::NoIdToken)?;
        jwt::decode_payload(id_token)
    }
}

/// Token endpoint response shape.
///
/// `access_token` is mandatory; everything else is provider-optional. A body
/// that does not fit this schema fails the exchange rather than being
/// accepted in degraded form.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub id_token: Option<String>,
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime in seconds; some providers send this as a string.
    #[serde(default, deserialize_with = "deserialize_i64_option")]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// Current wall-clock time in unix milliseconds.
pub(crate) fn unix_now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Deserialize optional integer durations encoded as string/number/null.
fn deserialize_i64_option<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    match value {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::Number(num) => num
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom("expires_in must be an integer"))
            .map(Some),
        serde_json::Value::String(text) => text
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|err| serde::de::Error::custom(format!("invalid expires_in: {err}"))),
        _ => Err(serde::de::Error::custom(
            "expires_in must be string, number, or null",
        )),
    }
}
