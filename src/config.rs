//! Session configuration: provider endpoints, client identity, refresh policy.

use serde::Deserialize;

use crate::error::ConfigError;

/// Default early-refresh slack in seconds.
const DEFAULT_REFRESH_SLACK_SECS: i64 = 5;
/// Default prefix applied to every persisted key.
const DEFAULT_STORAGE_PREFIX: &str = "authflow.";

/// Body encoding for token endpoint requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum ContentType {
    #[default]
    #[serde(rename = "application/x-www-form-urlencoded")]
    FormUrlencoded,
    #[serde(rename = "application/json")]
    Json,
}

impl ContentType {
    /// The literal header value this encoding produces on the wire.
    pub fn as_mime(&self) -> &'static str {
        match self {
            Self::FormUrlencoded => "application/x-www-form-urlencoded",
            Self::Json => "application/json",
        }
    }
}

/// Immutable configuration supplied when a session is constructed.
///
/// Endpoints default to paths under `provider` unless explicitly overridden,
/// so a minimal config needs only `client_id`, `provider`, and `redirect_uri`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub content_type: ContentType,
    /// Provider base URL, e.g. `https://auth.example.com`.
    pub provider: String,
    #[serde(default)]
    pub authorize_endpoint: Option<String>,
    #[serde(default)]
    pub token_endpoint: Option<String>,
    #[serde(default)]
    pub logout_endpoint: Option<String>,
    #[serde(default)]
    pub audience: Option<String>,
    pub redirect_uri: String,
    /// Requested scopes, space-joined into the `scope` parameter in order.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Optional `prompt` values; the parameter is omitted entirely when empty.
    #[serde(default)]
    pub prompts: Vec<String>,
    #[serde(default = "default_auto_refresh")]
    pub auto_refresh: bool,
    /// Seconds of slack applied when deriving `expires_at` from `expires_in`.
    #[serde(default = "default_refresh_slack_secs")]
    pub refresh_slack_secs: i64,
    #[serde(default = "default_storage_prefix")]
    pub storage_prefix: String,
}

fn default_auto_refresh() -> bool {
    true
}

fn default_refresh_slack_secs() -> i64 {
    DEFAULT_REFRESH_SLACK_SECS
}

fn default_storage_prefix() -> String {
    DEFAULT_STORAGE_PREFIX.to_string()
}

impl AuthConfig {
    /// Build a minimal config with defaults for everything optional.
    pub fn new(
        client_id: impl Into<String>,
        provider: impl Into<String>,
        redirect_uri: impl Into<String>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            content_type: ContentType::default(),
            provider: provider.into(),
            authorize_endpoint: None,
            token_endpoint: None,
            logout_endpoint: None,
            audience: None,
            redirect_uri: redirect_uri.into(),
            scopes: Vec::new(),
            prompts: Vec::new(),
            auto_refresh: default_auto_refresh(),
            refresh_slack_secs: default_refresh_slack_secs(),
            storage_prefix: default_storage_prefix(),
        }
    }

    /// Parse a config from TOML text and validate it.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Invalid("client_id must not be empty".into()));
        }
        if self.provider.trim().is_empty() {
            return Err(ConfigError::Invalid("provider must not be empty".into()));
        }
        if self.redirect_uri.trim().is_empty() {
            return Err(ConfigError::Invalid("redirect_uri must not be empty".into()));
        }
        if self.refresh_slack_secs < 0 {
            return Err(ConfigError::Invalid(
                "refresh_slack_secs must not be negative".into(),
            ));
        }
        Ok(())
    }

    /// Authorize endpoint: the override, or `{provider}/authorize`.
    pub fn authorize_url(&self) -> String {
        self.authorize_endpoint
            .clone()
            .unwrap_or_else(|| format!("{}/authorize", self.provider_base()))
    }

    /// Token endpoint: the override, or `{provider}/token`.
    pub fn token_url(&self) -> String {
        self.token_endpoint
            .clone()
            .unwrap_or_else(|| format!("{}/token", self.provider_base()))
    }

    /// Logout endpoint: the override, or `{provider}/logout`.
    pub fn logout_url(&self) -> String {
        self.logout_endpoint
            .clone()
            .unwrap_or_else(|| format!("{}/logout", self.provider_base()))
    }

    fn provider_base(&self) -> &str {
        self.provider.trim_end_matches('/')
    }
}
