//! End-to-end walk of the authorization code flow against a mock provider.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use authflow::config::AuthConfig;
use authflow::navigate::{MemoryNavigator, NavigationEvent, Navigator};
use authflow::pkce::PkcePair;
use authflow::session::AuthSession;
use authflow::store::{KeyValue, MemoryStore, AUTH_KEY, PKCE_KEY, PRE_AUTH_URI_KEY};

const PREFIX: &str = "authflow.";

/// Opt-in log output for debugging test runs (`RUST_LOG=debug`).
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn test_config(token_server: Option<&MockServer>) -> AuthConfig {
    let mut config = AuthConfig::new(
        "spa-client",
        "https://auth.example.com",
        "https://app.example.com/callback",
    );
    config.scopes = vec!["openid".into(), "profile".into()];
    if let Some(server) = token_server {
        config.token_endpoint = Some(format!("{}/oauth/token", server.uri()));
    }
    config
}

fn scoped(key: &str) -> String {
    format!("{PREFIX}{key}")
}

fn fake_id_token(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    format!("{header}.{payload}.sig")
}

#[tokio::test]
async fn full_authorize_redirect_exchange_walk() {
    init_logging();
    let server = MockServer::start().await;
    let backend = Arc::new(MemoryStore::new());

    // Phase 0: fresh load, no code in the URL, no stored session.
    let navigator = Arc::new(MemoryNavigator::new("https://app.example.com/docs?page=3"));
    let session = AuthSession::init(
        test_config(Some(&server)),
        backend.clone(),
        navigator.clone(),
    )
    .await;
    assert!(!session.is_pending());
    assert!(!session.is_authenticated());

    // Phase 1: authorize() persists intent and navigates to the provider.
    session.authorize().expect("authorize");
    assert!(session.is_pending());
    assert!(backend.has(&scoped(PKCE_KEY)));
    assert_eq!(
        backend.get(&scoped(PRE_AUTH_URI_KEY)).as_deref(),
        Some("https://app.example.com/docs?page=3")
    );

    let pkce_raw = backend.get(&scoped(PKCE_KEY)).expect("pkce json");
    let pair: PkcePair = serde_json::from_str(&pkce_raw).expect("pkce pair");

    let events = navigator.events();
    let NavigationEvent::Assign(authorize_url) = &events[0] else {
        panic!("expected assign, got {events:?}");
    };
    let authorize_url = Url::parse(authorize_url).expect("authorize url");
    let params: std::collections::HashMap<_, _> = authorize_url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    assert_eq!(params["client_id"], "spa-client");
    assert_eq!(params["scope"], "openid profile");
    assert_eq!(params["response_type"], "code");
    assert_eq!(params["redirect_uri"], "https://app.example.com/callback");
    assert_eq!(params["code_challenge"], pair.challenge);
    assert_eq!(params["code_challenge_method"], "S256");
    assert!(!params.contains_key("prompt"));

    // Phase 2: the provider redirects back with a code; the next page load
    // exchanges it with the stored verifier.
    let id_token = fake_id_token(&serde_json::json!({ "sub": "user-42" }));
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=XYZ"))
        .and(body_string_contains(format!("code_verifier={}", pair.verifier)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "id_token": id_token,
            "access_token": "at-1",
            "refresh_token": "rt-1",
            "expires_in": 3600,
            "token_type": "Bearer",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let return_navigator = Arc::new(MemoryNavigator::new(
        "https://app.example.com/callback?state=s1&code=XYZ",
    ));
    let resumed = AuthSession::init(
        test_config(Some(&server)),
        backend.clone(),
        return_navigator.clone(),
    )
    .await;

    assert!(resumed.is_authenticated());
    assert!(!resumed.is_pending());
    assert!(backend.has(&scoped(AUTH_KEY)));
    assert!(!backend.has(&scoped(PKCE_KEY)));
    assert!(!backend.has(&scoped(PRE_AUTH_URI_KEY)));

    let record = resumed.auth_tokens().expect("token record");
    assert_eq!(record.access_token, "at-1");
    assert_eq!(record.refresh_token.as_deref(), Some("rt-1"));
    assert!(record.expires_at.is_some());

    let user = resumed.user().expect("claims");
    assert_eq!(user["sub"], "user-42");

    // The code left the URL (other parameters intact) and navigation was
    // restored to the pre-authorization page.
    let events = return_navigator.events();
    assert_eq!(
        events[0],
        NavigationEvent::Replace("https://app.example.com/callback?state=s1".into())
    );
    assert_eq!(
        events[1],
        NavigationEvent::Assign("https://app.example.com/docs?page=3".into())
    );
}

#[tokio::test]
async fn failed_exchange_clears_session_and_strips_code() {
    init_logging();
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_string("invalid_grant"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = Arc::new(MemoryStore::new());
    let pair = authflow::pkce::generate().expect("pkce pair");
    backend.set(
        &scoped(PKCE_KEY),
        &serde_json::to_string(&pair).expect("pkce json"),
    );
    backend.set(&scoped(PRE_AUTH_URI_KEY), "https://app.example.com/home");

    let navigator = Arc::new(MemoryNavigator::new(
        "https://app.example.com/callback?code=BAD&x=1",
    ));
    let session = AuthSession::init(
        test_config(Some(&server)),
        backend.clone(),
        navigator.clone(),
    )
    .await;

    // Local recovery: nothing propagated, storage scrubbed, code stripped.
    assert!(!session.is_authenticated());
    assert!(!session.is_pending());
    assert!(!backend.has(&scoped(AUTH_KEY)));
    assert!(!backend.has(&scoped(PKCE_KEY)));
    assert!(!backend.has(&scoped(PRE_AUTH_URI_KEY)));
    assert_eq!(
        navigator.current_url(),
        "https://app.example.com/callback?x=1"
    );
    // No restore navigation after a failed exchange.
    assert_eq!(navigator.events().len(), 1);
}

#[tokio::test]
async fn refresh_carries_forward_unrotated_refresh_token() {
    let server = MockServer::start().await;
    // The refresh response omits refresh_token; the previous one must be
    // persisted with the fresh access token.
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=rt-keep"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-refreshed",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = Arc::new(MemoryStore::new());
    let navigator = Arc::new(MemoryNavigator::new("https://app.example.com/home"));
    let session = AuthSession::init(
        test_config(Some(&server)),
        backend.clone(),
        navigator.clone(),
    )
    .await;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_millis() as i64;
    backend.set(
        &scoped(AUTH_KEY),
        &serde_json::to_string(&serde_json::json!({
            "access_token": "at-old",
            "refresh_token": "rt-keep",
            "expires_at": now + 150,
        }))
        .expect("record json"),
    );

    session.start_timer();
    tokio::time::sleep(std::time::Duration::from_millis(600)).await;

    let record = session.auth_tokens().expect("refreshed record");
    assert_eq!(record.access_token, "at-refreshed");
    assert_eq!(record.refresh_token.as_deref(), Some("rt-keep"));
}

#[tokio::test]
async fn failed_refresh_clears_session_and_stops() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .expect(1)
        .mount(&server)
        .await;

    let backend = Arc::new(MemoryStore::new());
    let navigator = Arc::new(MemoryNavigator::new("https://app.example.com/home"));
    let session = AuthSession::init(
        test_config(Some(&server)),
        backend.clone(),
        navigator.clone(),
    )
    .await;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_millis() as i64;
    backend.set(
        &scoped(AUTH_KEY),
        &serde_json::to_string(&serde_json::json!({
            "access_token": "at-old",
            "refresh_token": "rt-dead",
            "expires_at": now + 150,
        }))
        .expect("record json"),
    );

    session.start_timer();
    tokio::time::sleep(std::time::Duration::from_millis(600)).await;

    assert!(!session.is_authenticated());
}

#[tokio::test]
async fn stale_session_at_init_is_dropped_without_network() {
    let server = MockServer::start().await;
    // Expect zero refresh calls for an already-expired record.
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let backend = Arc::new(MemoryStore::new());
    backend.set(
        &scoped(AUTH_KEY),
        &serde_json::to_string(&serde_json::json!({
            "access_token": "at-stale",
            "refresh_token": "rt-stale",
            "expires_at": 1_000,
        }))
        .expect("record json"),
    );

    let navigator = Arc::new(MemoryNavigator::new("https://app.example.com/home"));
    let session = AuthSession::init(
        test_config(Some(&server)),
        backend.clone(),
        navigator.clone(),
    )
    .await;

    assert!(!session.is_authenticated());
    assert!(!backend.has(&scoped(AUTH_KEY)));
}

#[tokio::test]
async fn logout_during_pending_refresh_wins_over_late_response() {
    let server = MockServer::start().await;
    // Delay the provider response so logout lands while the refresh
    // exchange is in flight.
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_millis(400))
                .set_body_json(serde_json::json!({
                    "access_token": "at-late",
                    "refresh_token": "rt-late",
                    "expires_in": 3600,
                })),
        )
        .mount(&server)
        .await;

    let backend = Arc::new(MemoryStore::new());
    let navigator = Arc::new(MemoryNavigator::new("https://app.example.com/home"));
    let session = AuthSession::init(
        test_config(Some(&server)),
        backend.clone(),
        navigator.clone(),
    )
    .await;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("clock")
        .as_millis() as i64;
    backend.set(
        &scoped(AUTH_KEY),
        &serde_json::to_string(&serde_json::json!({
            "access_token": "at-old",
            "refresh_token": "rt-old",
            "expires_at": now + 100,
        }))
        .expect("record json"),
    );

    session.start_timer();
    // Let the timer fire and the exchange start, then log out mid-flight.
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;
    session.logout(false).expect("logout");
    tokio::time::sleep(std::time::Duration::from_millis(600)).await;

    // The late response must not re-populate the store.
    assert!(!session.is_authenticated());
    assert!(!backend.has(&scoped(AUTH_KEY)));
}
