//! OAuth2 wire protocol: authorize/logout URL construction and the two
//! token-endpoint exchanges.

use std::time::Duration;

use url::Url;

use crate::config::{AuthConfig, ContentType};
use crate::error::AuthError;
use crate::tokens::TokenResponse;

/// Shared HTTP timeout for token endpoint requests.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = concat!("authflow/", env!("CARGO_PKG_VERSION"));

/// Default HTTP client for sessions that do not inject their own.
pub(crate) fn default_http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}

/// Build the authorization redirect URL for a challenge.
///
/// `prompt` and `audience` are omitted entirely when not configured.
pub fn build_authorize_url(config: &AuthConfig, challenge: &str) -> Result<Url, AuthError> {
    let mut url = Url::parse(&config.authorize_url())
        .map_err(|err| AuthError::Invalid(format!("invalid authorize endpoint: {err}")))?;
    {
        let mut pairs = url.query_pairs_mut();
        pairs.append_pair("client_id", &config.client_id);
        pairs.append_pair("scope", &config.scopes.join(" "));
        if !config.prompts.is_empty() {
            pairs.append_pair("prompt", &config.prompts.join(" "));
        }
        pairs.append_pair("response_type", "code");
        pairs.append_pair("redirect_uri", &config.redirect_uri);
        if let Some(audience) = &config.audience {
            pairs.append_pair("audience", audience);
        }
        pairs.append_pair("code_challenge", challenge);
        pairs.append_pair("code_challenge_method", "S256");
    }
    Ok(url)
}

/// Build the provider logout URL.
pub fn build_logout_url(config: &AuthConfig) -> Result<Url, AuthError> {
    let mut url = Url::parse(&config.logout_url())
        .map_err(|err| AuthError::Invalid(format!("invalid logout endpoint: {err}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", &config.client_id)
        .append_pair("post_logout_redirect_uri", &config.redirect_uri);
    Ok(url)
}

/// Exchange an authorization code plus its PKCE verifier for tokens.
pub async fn exchange_code(
    client: &reqwest::Client,
    config: &AuthConfig,
    code: &str,
    verifier: &str,
) -> Result<TokenResponse, AuthError> {
    let mut params = vec![("client_id", config.client_id.clone())];
    if let Some(secret) = &config.client_secret {
        params.push(("client_secret", secret.clone()));
    }
    params.push(("redirect_uri", config.redirect_uri.clone()));
    params.push(("grant_type", "authorization_code".to_string()));
    params.push(("code", code.to_string()));
    params.push(("code_verifier", verifier.to_string()));
    token_request(client, config, &params).await
}

/// Exchange a refresh token for a fresh token set.
///
/// The response may omit `refresh_token`; the session carries the previous
/// one forward in that case.
pub async fn refresh_tokens(
    client: &reqwest::Client,
    config: &AuthConfig,
    refresh_token: &str,
) -> Result<TokenResponse, AuthError> {
    let mut params = vec![("client_id", config.client_id.clone())];
    if let Some(secret) = &config.client_secret {
        params.push(("client_secret", secret.clone()));
    }
    params.push(("grant_type", "refresh_token".to_string()));
    params.push(("refresh_token", refresh_token.to_string()));
    token_request(client, config, &params).await
}

/// POST to the token endpoint and decode the response. Never retries.
async fn token_request(
    client: &reqwest::Client,
    config: &AuthConfig,
    params: &[(&str, String)],
) -> Result<TokenResponse, AuthError> {
    let request = client.post(config.token_url());
    let request = match config.content_type {
        ContentType::FormUrlencoded => request.form(params),
        ContentType::Json => {
            let body: serde_json::Map<String, serde_json::Value> = params
                .iter()
                .map(|(key, value)| ((*key).to_string(), serde_json::Value::from(value.clone())))
                .collect();
            request.json(&body)
        }
    };

    let response = request.send().await.map_err(|err| {
        AuthError::TokenExchangeFailed {
            status: err.status().map(|status| status.as_u16()),
            detail: err.to_string(),
        }
    })?;

    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| AuthError::TokenExchangeFailed {
            status: Some(status.as_u16()),
            detail: err.to_string(),
        })?;

    if !status.is_success() {
        return Err(AuthError::TokenExchangeFailed {
            status: Some(status.as_u16()),
            detail: body,
        });
    }

    serde_json::from_str(&body).map_err(|err| AuthError::TokenExchangeFailed {
        status: Some(status.as_u16()),
        detail: format!("unexpected token response shape: {err}"),
    })
}
