//! Error types for the auth session crate.

use std::fmt;

// ---------------------------------------------------------------------------
// AuthError
// ---------------------------------------------------------------------------

/// Errors surfaced by the PKCE session subsystem.
#[derive(Debug)]
pub enum AuthError {
    /// No cryptographically secure randomness is available; fatal to `authorize()`.
    RandomSourceUnavailable(String),
    /// A pending authorization was expected but no PKCE pair is stored.
    PkceNotFound,
    /// Session data was queried while no token record exists.
    AuthNotFound,
    /// The stored token record carries no ID token.
    NoIdToken,
    /// The token endpoint rejected a code or refresh exchange, or returned
    /// a body that does not match the token response schema.
    TokenExchangeFailed {
        status: Option<u16>,
        detail: String,
    },
    /// Malformed input: endpoint URLs, ID token segments, store payloads.
    Invalid(String),
    /// Filesystem failure in the persistent store backend.
    Io(std::io::Error),
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RandomSourceUnavailable(msg) => {
                write!(f, "secure random source unavailable: {msg}")
            }
            Self::PkceNotFound => write!(f, "no pkce pair stored for pending authorization"),
            Self::AuthNotFound => write!(f, "not authenticated: no token record stored"),
            Self::NoIdToken => write!(f, "token record does not include an id token"),
            Self::TokenExchangeFailed { status, detail } => match status {
                Some(code) => write!(f, "token exchange failed (status {code}): {detail}"),
                None => write!(f, "token exchange failed: {detail}"),
            },
            Self::Invalid(msg) => write!(f, "{msg}"),
            Self::Io(err) => write!(f, "io: {err}"),
        }
    }
}

impl std::error::Error for AuthError {}

impl From<std::io::Error> for AuthError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors when loading or validating session configuration.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Toml(toml::de::Error),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io: {e}"),
            Self::Toml(e) => write!(f, "toml: {e}"),
            Self::Invalid(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        Self::Toml(e)
    }
}
