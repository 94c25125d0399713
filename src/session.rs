//! Session state machine: resumption from redirect, token lifecycle, and
//! the self-rearming refresh timer.
//!
//! The flow is a two-phase protocol. Phase 1, [`AuthSession::authorize`],
//! persists intent (PKCE pair and return URL) and navigates away. Phase 2
//! happens at construction: [`AuthSession::init`] scans the current URL for
//! an authorization code and resumes the persisted intent, so constructing
//! a session is a resumption hook, not mere initialization.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::navigate::Navigator;
use crate::protocol;
use crate::query;
use crate::store::{KeyValue, TokenStore};
use crate::tokens::{unix_now_ms, TokenRecord};

struct SessionInner {
    config: AuthConfig,
    store: TokenStore,
    navigator: Arc<dyn Navigator>,
    http: reqwest::Client,
    /// Outstanding refresh timer; re-arming aborts the previous handle so
    /// at most one timer is ever pending.
    refresh_task: Mutex<Option<JoinHandle<()>>>,
    /// Bumped by `authorize` and `logout`; a refresh task whose snapshot no
    /// longer matches must not touch storage.
    generation: AtomicU64,
}

impl SessionInner {
    fn refresh_slot(&self) -> std::sync::MutexGuard<'_, Option<JoinHandle<()>>> {
        self.refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(task) = self.refresh_slot().take() {
            task.abort();
        }
    }
}

/// Client-side OAuth2 Authorization Code + PKCE session.
///
/// Cheap to clone; clones share state and the refresh timer.
#[derive(Clone)]
pub struct AuthSession {
    inner: Arc<SessionInner>,
}

impl AuthSession {
    /// Construct a session and resume any in-flight authorization.
    ///
    /// When the current URL carries a `code` parameter, it is exchanged for
    /// tokens using the stored PKCE verifier; exchange failures are logged
    /// and recovered locally, never returned, because the navigation that
    /// delivered the code has no caller left to catch them. Without a code,
    /// an authenticated session arms the refresh timer (if auto-refresh is
    /// on).
    pub async fn init(
        config: AuthConfig,
        backend: Arc<dyn KeyValue>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        Self::init_with_client(config, backend, navigator, protocol::default_http_client()).await
    }

    /// Like [`AuthSession::init`] with an injected HTTP client.
    pub async fn init_with_client(
        config: AuthConfig,
        backend: Arc<dyn KeyValue>,
        navigator: Arc<dyn Navigator>,
        http: reqwest::Client,
    ) -> Self {
        let store = TokenStore::new(backend, &config.storage_prefix);
        let session = Self {
            inner: Arc::new(SessionInner {
                config,
                store,
                navigator,
                http,
                refresh_task: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        };

        let current = session.inner.navigator.current_url();
        if let Some(code) = query::code_param(&current) {
            session.resume_from_redirect(&code).await;
        } else if session.inner.config.auto_refresh && session.is_authenticated() {
            session.start_timer();
        }
        session
    }

    /// True while a redirect round-trip is unresolved: a PKCE pair exists
    /// and no token record does.
    pub fn is_pending(&self) -> bool {
        self.inner.store.has_pkce_pair() && !self.inner.store.has_tokens()
    }

    /// True when a token record exists. Expiry is not re-checked here;
    /// staleness is the refresh timer's concern.
    pub fn is_authenticated(&self) -> bool {
        self.inner.store.has_tokens()
    }

    /// The stored token record.
    pub fn auth_tokens(&self) -> Result<TokenRecord, AuthError> {
        self.inner.store.tokens().ok_or(AuthError::AuthNotFound)
    }

    /// Decoded (unverified) claims from the stored ID token.
    pub fn user(&self) -> Result<serde_json::Value, AuthError> {
        self.auth_tokens()?.id_token_claims()
    }

    /// Begin an authorization attempt: persist a fresh PKCE pair and the
    /// current URL, clear any existing tokens, and navigate to the
    /// provider's authorize endpoint.
    ///
    /// On success control transfers away; the flow resumes at the next
    /// [`AuthSession::init`].
    pub fn authorize(&self) -> Result<(), AuthError> {
        let pair = crate::pkce::generate()?;
        self.invalidate_refresh();
        let inner = &self.inner;
        inner.store.set_pkce_pair(&pair);
        inner.store.set_pre_auth_uri(&inner.navigator.current_url());
        inner.store.clear_tokens();
        let url = protocol::build_authorize_url(&inner.config, &pair.challenge)?;
        inner.navigator.assign(url.as_str());
        Ok(())
    }

    /// Drop the session. With `end_session` the provider's logout endpoint
    /// is visited; otherwise the current page reloads into an
    /// unauthenticated state. Idempotent.
    pub fn logout(&self, end_session: bool) -> Result<(), AuthError> {
        self.invalidate_refresh();
        let inner = &self.inner;
        inner.store.clear_pkce_pair();
        inner.store.clear_tokens();
        if end_session {
            let url = protocol::build_logout_url(&inner.config)?;
            inner.navigator.assign(url.as_str());
        } else {
            inner.navigator.reload();
        }
        Ok(())
    }

    /// Arm the refresh timer from the stored token record.
    ///
    /// Does nothing without a record, an `expires_at`, and a refresh token.
    /// A record whose refresh window has already passed is stale: it is
    /// deleted, any stray code is stripped from the URL, and no refresh is
    /// attempted.
    pub fn start_timer(&self) {
        let Some(record) = self.inner.store.tokens() else {
            return;
        };
        let (Some(expires_at), Some(refresh_token)) = (record.expires_at, record.refresh_token)
        else {
            return;
        };
        let timeout_ms = expires_at.saturating_sub(unix_now_ms());
        if timeout_ms <= 0 {
            debug!("stored session already stale; clearing instead of refreshing");
            self.clear_stale_session();
            return;
        }
        self.arm_refresh(timeout_ms as u64, refresh_token);
    }

    async fn resume_from_redirect(&self, code: &str) {
        let inner = &self.inner;
        let exchanged = self.exchange_redirect_code(code).await;

        // The code leaves the visible URL whether or not the exchange
        // worked; other query parameters stay in place.
        let stripped = query::strip_code_param(&inner.navigator.current_url());
        inner.navigator.replace(&stripped);
        let pre_auth_uri = inner.store.pre_auth_uri();
        inner.store.clear_pkce_pair();
        inner.store.clear_pre_auth_uri();

        match exchanged {
            Ok(record) => {
                inner.store.set_tokens(&record);
                if let Some(uri) = pre_auth_uri {
                    inner.navigator.assign(&uri);
                }
            }
            Err(err) => {
                inner.store.clear_tokens();
                error!(error = %err, "authorization code exchange failed; session cleared");
            }
        }
    }

    async fn exchange_redirect_code(&self, code: &str) -> Result<TokenRecord, AuthError> {
        let inner = &self.inner;
        let pair = inner.store.pkce_pair().ok_or(AuthError::PkceNotFound)?;
        let response =
            protocol::exchange_code(&inner.http, &inner.config, code, &pair.verifier).await?;
        Ok(TokenRecord::from_response(
            response,
            None,
            inner.config.refresh_slack_secs,
        ))
    }

    /// Delete the token record and scrub any stray code from the URL.
    fn clear_stale_session(&self) {
        let inner = &self.inner;
        inner.store.clear_tokens();
        let stripped = query::strip_code_param(&inner.navigator.current_url());
        inner.navigator.replace(&stripped);
    }

    /// Invalidate any outstanding or in-flight refresh work.
    fn invalidate_refresh(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(task) = self.inner.refresh_slot().take() {
            task.abort();
        }
    }

    fn stale(&self, generation: u64) -> bool {
        self.inner.generation.load(Ordering::SeqCst) != generation
    }

    fn arm_refresh(&self, delay_ms: u64, refresh_token: String) {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        // Cancel before arming: the previous timer is gone before its
        // replacement exists, so two schedules never overlap.
        let mut slot = self.inner.refresh_slot();
        if let Some(previous) = slot.take() {
            previous.abort();
        }
        // The task holds only a weak handle so a dropped session does not
        // stay alive inside its own timer.
        let handle = Arc::downgrade(&self.inner);
        *slot = Some(tokio::spawn(refresh_loop(
            handle,
            generation,
            delay_ms,
            refresh_token,
        )));
    }
}

/// Sleep until the refresh deadline, exchange, persist, and re-arm.
///
/// The loop replaces recursive timer scheduling: one task is the one
/// outstanding timer, and each successful refresh computes the next delay.
/// Any failure clears the session and ends the chain; no retry.
async fn refresh_loop(
    handle: Weak<SessionInner>,
    generation: u64,
    mut delay_ms: u64,
    mut refresh_token: String,
) {
    loop {
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        let Some(inner) = handle.upgrade() else {
            return;
        };
        let session = AuthSession { inner };
        if session.stale(generation) {
            return;
        }

        let refreshed =
            protocol::refresh_tokens(&session.inner.http, &session.inner.config, &refresh_token)
                .await;
        if session.stale(generation) {
            // Logged out while the exchange was in flight; the late result
            // must not resurrect the session.
            return;
        }

        match refreshed {
            Ok(response) => {
                let record = TokenRecord::from_response(
                    response,
                    Some(&refresh_token),
                    session.inner.config.refresh_slack_secs,
                );
                session.inner.store.set_tokens(&record);
                let now = unix_now_ms();
                match (record.expires_at, record.refresh_token) {
                    (Some(expires_at), Some(next_refresh)) if expires_at > now => {
                        delay_ms = (expires_at - now) as u64;
                        refresh_token = next_refresh;
                    }
                    (Some(_), Some(_)) => {
                        // The fresh record is already past its window.
                        session.clear_stale_session();
                        return;
                    }
                    _ => {
                        debug!("refresh response lacks expiry or refresh token; timer stops");
                        return;
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed; clearing session");
                session.clear_stale_session();
                return;
            }
        }
    }
}
