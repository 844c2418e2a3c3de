//! Durable key/value store for guest-session state.
//!
//! The browser build keeps this data in localStorage. Here it is a small
//! JSON object on disk with last-write-wins semantics across processes.
//! Any error from an implementation means the store is unavailable and
//! callers apply their documented fail-open or fail-closed policy.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::EntitlementError;

/// Key holding the opaque guest session identifier.
pub const GUEST_SESSION_KEY: &str = "guestSessionId";

/// Prefix for per-action guest counters, e.g. `guestAction:exportResume`.
pub const GUEST_ACTION_PREFIX: &str = "guestAction:";

const STORE_FILE: &str = "guest_session.json";

pub trait GuestStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, EntitlementError>;
    fn set(&self, key: &str, value: &str) -> Result<(), EntitlementError>;
    fn remove(&self, key: &str) -> Result<(), EntitlementError>;
    fn keys(&self) -> Result<Vec<String>, EntitlementError>;
}

/// Returns the persisted guest session id, minting one on first access.
/// The id is opaque to everything downstream of this function.
pub fn ensure_guest_session_id(store: &dyn GuestStore) -> Result<String, EntitlementError> {
    if let Some(id) = store.get(GUEST_SESSION_KEY)? {
        return Ok(id);
    }
    let id = Uuid::new_v4().to_string();
    store.set(GUEST_SESSION_KEY, &id)?;
    debug!("Minted guest session id {id}");
    Ok(id)
}

/// JSON-object-on-disk store, one file per storage directory.
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    pub fn open(dir: &Path) -> Result<Self, EntitlementError> {
        fs::create_dir_all(dir).map_err(|e| {
            EntitlementError::Storage(format!("create {}: {e}", dir.display()))
        })?;
        let path = dir.join(STORE_FILE);
        let entries = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                warn!("Guest store at {} is corrupt, starting empty: {e}", path.display());
                BTreeMap::new()
            }),
            Err(_) => BTreeMap::new(),
        };
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, EntitlementError> {
        self.entries
            .lock()
            .map_err(|_| EntitlementError::Storage("guest store lock poisoned".to_string()))
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> Result<(), EntitlementError> {
        let raw = serde_json::to_string(entries)?;
        fs::write(&self.path, raw).map_err(|e| {
            EntitlementError::Storage(format!("write {}: {e}", self.path.display()))
        })
    }
}

impl GuestStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, EntitlementError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), EntitlementError> {
        let mut entries = self.lock()?;
        entries.insert(key.to_string(), value.to_string());
        self.flush(&entries)
    }

    fn remove(&self, key: &str) -> Result<(), EntitlementError> {
        let mut entries = self.lock()?;
        if entries.remove(key).is_some() {
            self.flush(&entries)?;
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, EntitlementError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}

/// In-memory store. Non-persistent stand-in for execution contexts without
/// a writable disk, and the default store in tests. `unavailable()` builds
/// one whose every operation fails, for exercising fail-open paths.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
    unavailable: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unavailable() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            unavailable: true,
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, String>>, EntitlementError> {
        if self.unavailable {
            return Err(EntitlementError::Storage("store unavailable".to_string()));
        }
        self.entries
            .lock()
            .map_err(|_| EntitlementError::Storage("guest store lock poisoned".to_string()))
    }
}

impl GuestStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, EntitlementError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), EntitlementError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), EntitlementError> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>, EntitlementError> {
        Ok(self.lock()?.keys().cloned().collect())
    }
}
