//! Navigation seam: the session's view of the hosting environment's URL bar.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

/// Navigation capability the session drives.
///
/// `assign` is a full navigation that transfers control away from the
/// caller; `replace` rewrites the visible URL in place without reloading;
/// `reload` re-enters the current URL from scratch.
pub trait Navigator: Send + Sync {
    fn current_url(&self) -> String;
    fn assign(&self, url: &str);
    fn replace(&self, url: &str);
    fn reload(&self);
}

/// One observed navigation action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NavigationEvent {
    Assign(String),
    Replace(String),
    Reload,
}

/// Recording navigator for tests and headless hosts.
#[derive(Debug)]
pub struct MemoryNavigator {
    current: Mutex<String>,
    events: Mutex<Vec<NavigationEvent>>,
}

impl MemoryNavigator {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(url.into()),
            events: Mutex::new(Vec::new()),
        }
    }

    /// Every navigation observed so far, in order.
    pub fn events(&self) -> Vec<NavigationEvent> {
        self.lock(&self.events).clone()
    }

    fn lock<'a, T>(&self, mutex: &'a Mutex<T>) -> MutexGuard<'a, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Navigator for MemoryNavigator {
    fn current_url(&self) -> String {
        self.lock(&self.current).clone()
    }

    fn assign(&self, url: &str) {
        *self.lock(&self.current) = url.to_string();
        self.lock(&self.events)
            .push(NavigationEvent::Assign(url.to_string()));
    }

    fn replace(&self, url: &str) {
        *self.lock(&self.current) = url.to_string();
        self.lock(&self.events)
            .push(NavigationEvent::Replace(url.to_string()));
    }

    fn reload(&self) {
        self.lock(&self.events).push(NavigationEvent::Reload);
    }
}

/// Navigator for desktop hosts: full navigations open the system browser.
#[derive(Debug)]
pub struct SystemNavigator {
    current: Mutex<String>,
}

impl SystemNavigator {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            current: Mutex::new(url.into()),
        }
    }

    fn current(&self) -> MutexGuard<'_, String> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Navigator for SystemNavigator {
    fn current_url(&self) -> String {
        self.current().clone()
    }

    fn assign(&self, url: &str) {
        *self.current() = url.to_string();
        if !try_open_browser(url) {
            warn!(url, "failed to open system browser");
        }
    }

    fn replace(&self, url: &str) {
        *self.current() = url.to_string();
    }

    fn reload(&self) {
        let url = self.current_url();
        if !try_open_browser(&url) {
            warn!(url, "failed to open system browser");
        }
    }
}

/// Best-effort browser opener for login and logout navigations.
pub fn try_open_browser(url: &str) -> bool {
    #[cfg(target_os = "macos")]
    {
        // macOS standard browser launcher.
        return std::process::Command::new("open")
            .arg(url)
            .status()
            .is_ok_and(|status| status.success());
    }
    #[cfg(target_os = "windows")]
    {
        // Windows shell launcher.
        return std::process::Command::new("cmd")
            .args(["/C", "start", "", url])
            .status()
            .is_ok_and(|status| status.success());
    }
    #[cfg(all(unix, not(target_os = "macos")))]
    {
        // Linux/BSD desktop launcher.
        return std::process::Command::new("xdg-open")
            .arg(url)
            .status()
            .is_ok_and(|status| status.success());
    }
    #[allow(unreachable_code)]
    false
}
