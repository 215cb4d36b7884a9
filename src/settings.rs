//! Caller identity, persisted across sessions.
//!
//! [`SettingsStore`] is an explicit handle rather than a global: the API client
//! and the mutation coordinator receive a clone at construction time, and
//! tests build isolated instances on top of [`MemoryStorage`].
//!
//! ```
//! use shopsync::settings::SettingsStore;
//!
//! let store = SettingsStore::in_memory();
//! store.set_user_id("u2");
//! assert_eq!(store.get().user_id, "u2");
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Storage key for the user id.
pub const USER_ID_KEY: &str = "userId";
/// Storage key for the admin key.
pub const ADMIN_KEY_KEY: &str = "adminKey";

/// Caller identity. Empty strings mean "not provided".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "adminKey")]
    pub admin_key: String,
}

/// Error raised by a [`SettingsStorage`] backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Malformed settings file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Durable key-value storage backing the settings store.
pub trait SettingsStorage: Send + Sync {
    /// Returns the stored value for `key`, if any.
    fn load(&self, key: &str) -> Option<String>;

    /// Persists `value` under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not persist the value.
    fn store(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// Process-local storage, used by tests and when persistence is disabled.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    values: Mutex<BTreeMap<String, String>>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStorage for MemoryStorage {
    fn load(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn store(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.values.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Storage backed by a JSON object file, rewritten on every store.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl FileStorage {
    /// Opens the file at `path`. A missing file is treated as empty.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let values = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| {
                StorageError::Malformed {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(StorageError::Io { path, source }),
        };

        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, values: &BTreeMap<String, String>) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io {
            path: self.path.clone(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let bytes = serde_json::to_vec_pretty(values).map_err(|source| StorageError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, bytes).map_err(io_err)
    }
}

impl SettingsStorage for FileStorage {
    fn load(&self, key: &str) -> Option<String> {
        self.values.lock().get(key).cloned()
    }

    fn store(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut values = self.values.lock();
        values.insert(key.to_string(), value.to_string());
        self.flush(&values)
    }
}

type Listener = Arc<dyn Fn(&Settings) + Send + Sync>;

struct StoreInner {
    state: RwLock<Settings>,
    storage: Arc<dyn SettingsStorage>,
    listeners: Mutex<Vec<(u64, Listener)>>,
    next_listener: AtomicU64,
}

/// Shared handle to the caller's settings.
#[derive(Clone)]
pub struct SettingsStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for SettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("SettingsStore")
            .field("user_id", &state.user_id)
            .field("admin_key", &"[REDACTED]")
            .finish()
    }
}

impl SettingsStore {
    /// Seeds a store from `storage`.
    ///
    /// This is the only time storage is read; afterwards the store is the
    /// source of truth and storage is write-through.
    #[must_use]
    pub fn load(storage: Arc<dyn SettingsStorage>, default_user_id: &str) -> Self {
        let settings = Settings {
            user_id: storage
                .load(USER_ID_KEY)
                .unwrap_or_else(|| default_user_id.to_string()),
            admin_key: storage.load(ADMIN_KEY_KEY).unwrap_or_default(),
        };
        debug!(user_id = %settings.user_id, "settings loaded");

        Self {
            inner: Arc::new(StoreInner {
                state: RwLock::new(settings),
                storage,
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// An isolated, unauthenticated store backed by memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::load(Arc::new(MemoryStorage::new()), "")
    }

    /// Current settings.
    #[must_use]
    pub fn get(&self) -> Settings {
        self.inner.state.read().clone()
    }

    pub fn set_user_id(&self, value: impl Into<String>) {
        let value = value.into();
        self.write(USER_ID_KEY, &value, |settings| settings.user_id = value.clone());
    }

    pub fn set_admin_key(&self, value: impl Into<String>) {
        let value = value.into();
        self.write(ADMIN_KEY_KEY, &value, |settings| settings.admin_key = value.clone());
    }

    /// Registers a listener called synchronously after every change.
    pub fn subscribe<F>(&self, listener: F) -> SettingsSubscription
    where
        F: Fn(&Settings) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((id, Arc::new(listener)));
        SettingsSubscription {
            store: Arc::downgrade(&self.inner),
            id,
        }
    }

    fn write(&self, key: &str, value: &str, apply: impl FnOnce(&mut Settings)) {
        let snapshot = {
            let mut state = self.inner.state.write();
            apply(&mut state);
            state.clone()
        };

        if let Err(err) = self.inner.storage.store(key, value) {
            warn!(key, error = %err, "failed to persist setting");
        }

        let listeners: Vec<Listener> = self
            .inner
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();
        for listener in listeners {
            listener(&snapshot);
        }
    }
}

/// Guard returned by [`SettingsStore::subscribe`]. Dropping it detaches the listener.
pub struct SettingsSubscription {
    store: std::sync::Weak<StoreInner>,
    id: u64,
}

impl SettingsSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for SettingsSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.store.upgrade() {
            inner.listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}
