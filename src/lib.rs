//! authflow — client-side OAuth2 Authorization Code flow with PKCE.
//!
//! Obtains, persists, and transparently refreshes access/ID tokens without
//! a client secret and without a server-side session. Persistence and
//! navigation are capabilities the host supplies ([`store::KeyValue`] and
//! [`navigate::Navigator`]), so the same session logic runs inside a
//! webview host, a desktop app using the system browser, or a test harness.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use authflow::config::AuthConfig;
//! use authflow::navigate::SystemNavigator;
//! use authflow::session::AuthSession;
//! use authflow::store::FileStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = AuthConfig::new(
//!     "my-client-id",
//!     "https://auth.example.com",
//!     "http://localhost:8137/callback",
//! );
//! config.scopes = vec!["openid".into(), "profile".into()];
//!
//! let store = Arc::new(FileStore::open("session.json")?);
//! let navigator = Arc::new(SystemNavigator::new("http://localhost:8137/"));
//! let session = AuthSession::init(config, store, navigator).await;
//!
//! if !session.is_authenticated() {
//!     session.authorize()?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod jwt;
pub mod navigate;
pub mod pkce;
pub mod protocol;
pub mod query;
pub mod session;
pub mod store;
pub mod tokens;

pub use config::AuthConfig;
pub use error::AuthError;
pub use session::AuthSession;
pub use tokens::TokenRecord;
