//! Prefixed key-value persistence for PKCE pairs, tokens, and return URLs.

mod crypto;
mod file;

pub use file::FileStore;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::warn;

use crate::pkce::PkcePair;
use crate::tokens::TokenRecord;

/// Key under the prefix holding the serialized PKCE pair.
pub const PKCE_KEY: &str = "pkce";
/// Key under the prefix holding the serialized token record.
pub const AUTH_KEY: &str = "auth";
/// Key under the prefix holding the raw pre-authorization URL.
pub const PRE_AUTH_URI_KEY: &str = "preAuthUri";

/// Persistence capability the session runs against.
///
/// Implementations must tolerate reads before any key exists and survive a
/// full process restart when used for real sessions. Operations are
/// infallible; backends log and degrade rather than raise.
pub trait KeyValue: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str);
    fn remove(&self, key: &str);
    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }
}

/// In-memory backend for tests and headless embedding. Does not survive
/// process restart; real sessions want [`FileStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeyValue for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        self.entries().insert(key.to_string(), value.to_string());
    }

    fn remove(&self, key: &str) {
        self.entries().remove(key);
    }

    fn has(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }
}

/// Typed, prefix-scoped view over a [`KeyValue`] backend.
///
/// Undecodable stored values read as absent; the session treats "missing"
/// as "not in that state", so a corrupt entry degrades to a clean slate.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValue>,
    prefix: String,
}

impl TokenStore {
    pub fn new(backend: Arc<dyn KeyValue>, prefix: &str) -> Self {
        Self {
            backend,
            prefix: prefix.to_string(),
        }
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }

    pub fn pkce_pair(&self) -> Option<PkcePair> {
        self.get_json(PKCE_KEY)
    }

    pub fn set_pkce_pair(&self, pair: &PkcePair) {
        self.set_json(PKCE_KEY, pair);
    }

    pub fn clear_pkce_pair(&self) {
        self.backend.remove(&self.scoped(PKCE_KEY));
    }

    pub fn has_pkce_pair(&self) -> bool {
        self.backend.has(&self.scoped(PKCE_KEY))
    }

    pub fn tokens(&self) -> Option<TokenRecord> {
        self.get_json(AUTH_KEY)
    }

    pub fn set_tokens(&self, record: &TokenRecord) {
        self.set_json(AUTH_KEY, record);
    }

    pub fn clear_tokens(&self) {
        self.backend.remove(&self.scoped(AUTH_KEY));
    }

    pub fn has_tokens(&self) -> bool {
        self.backend.has(&self.scoped(AUTH_KEY))
    }

    pub fn pre_auth_uri(&self) -> Option<String> {
        self.backend.get(&self.scoped(PRE_AUTH_URI_KEY))
    }

    pub fn set_pre_auth_uri(&self, uri: &str) {
        self.backend.set(&self.scoped(PRE_AUTH_URI_KEY), uri);
    }

    pub fn clear_pre_auth_uri(&self) {
        self.backend.remove(&self.scoped(PRE_AUTH_URI_KEY));
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.backend.get(&self.scoped(key))?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(err) => {
                warn!(key, error = %err, "discarding undecodable stored value");
                None
            }
        }
    }

    fn set_json<T: serde::Serialize>(&self, key: &str, value: &T) {
        match serde_json::to_string(value) {
            Ok(raw) => self.backend.set(&self.scoped(key), &raw),
            Err(err) => warn!(key, error = %err, "failed to serialize value for storage"),
        }
    }
}
