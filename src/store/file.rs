//! File-backed key-value store, encrypted at rest.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::warn;

use super::crypto;
use super::KeyValue;
use crate::error::AuthError;

/// Persistent [`KeyValue`] backend.
///
/// The whole store is loaded at open and rewritten (sealed) on every
/// mutation. Writes are best-effort: a failed persist keeps the in-memory
/// state and logs, because the capability contract is infallible.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open a store file, creating an empty store when the file is missing.
    ///
    /// Fails when the file exists but cannot be read or decrypted (for
    /// example after the machine identity changed).
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, AuthError> {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(text) => {
                let sealed: crypto::SealedStore = serde_json::from_str(&text).map_err(|err| {
                    AuthError::Invalid(format!(
                        "failed to parse session store `{}`: {err}",
                        path.display()
                    ))
                })?;
                crypto::open_store(&sealed)?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(AuthError::Io(err)),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Default store location under the user config dir, e.g.
    /// `~/.config/<app>/session.json`.
    pub fn default_path(app: &str) -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(app).join("session.json"))
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), AuthError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                let _ = std::fs::set_permissions(parent, std::fs::Permissions::from_mode(0o700));
            }
        }

        let sealed = crypto::seal_store(entries)?;
        let text = serde_json::to_string_pretty(&sealed).map_err(|err| {
            AuthError::Invalid(format!("failed to serialize session store: {err}"))
        })?;
        let mut options = std::fs::OpenOptions::new();
        options.create(true).truncate(true).write(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&self.path)?;
        file.write_all(text.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn persist_or_warn(&self, entries: &BTreeMap<String, String>) {
        if let Err(err) = self.persist(entries) {
            warn!(path = %self.path.display(), error = %err, "failed to persist session store");
        }
    }
}

impl KeyValue for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut entries = self.entries();
        entries.insert(key.to_string(), value.to_string());
        self.persist_or_warn(&entries);
    }

    fn remove(&self, key: &str) {
        let mut entries = self.entries();
        if entries.remove(key).is_some() {
            self.persist_or_warn(&entries);
        }
    }

    fn has(&self, key: &str) -> bool {
        self.entries().contains_key(key)
    }
}
