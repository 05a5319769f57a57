/*
 * The hierarchical key-path registry backing Docky's preferences. Keys are
 * absolute slash-separated paths (e.g. `/apps/docky/bookmarks/show_hidden`)
 * mapped to typed values. The registry persists itself as a JSON document and
 * notifies prefix-scoped subscribers on every successful write.
 *
 * It uses a trait-based approach (`SettingsRegistryOperations`) so preference
 * owners can be handed mock registries in tests. The concrete implementation
 * (`CoreSettingsRegistry`) keeps the full map in memory and rewrites the
 * backing file on each mutation.
 */
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

#[derive(Debug)]
pub enum SettingsError {
    Io(io::Error),
    Serde(serde_json::Error),
}

impl From<io::Error> for SettingsError {
    fn from(err: io::Error) -> Self {
        SettingsError::Io(err)
    }
}

impl From<serde_json::Error> for SettingsError {
    fn from(err: serde_json::Error) -> Self {
        SettingsError::Serde(err)
    }
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::Io(e) => write!(f, "Settings I/O error: {e}"),
            SettingsError::Serde(e) => write!(f, "Settings serialization error: {e}"),
        }
    }
}

impl std::error::Error for SettingsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SettingsError::Io(e) => Some(e),
            SettingsError::Serde(e) => Some(e),
        }
    }
}

pub type Result<T> = std::result::Result<T, SettingsError>;

// The registry's value types. Untagged so the JSON file reads naturally
// (`true`, `42`, `"string"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    Bool(bool),
    Int(i64),
    Str(String),
}

/// Identifies a change subscription so it can be unregistered later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotifyId(u64);

pub type NotifyCallback = Arc<dyn Fn(&str, &SettingValue) + Send + Sync>;

pub trait SettingsRegistryOperations: Send + Sync {
    fn read(&self, path: &str) -> Result<Option<SettingValue>>;
    fn write(&self, path: &str, value: SettingValue) -> Result<()>;
    fn add_notify(&self, prefix: &str, callback: NotifyCallback) -> NotifyId;
    fn remove_notify(&self, id: NotifyId);
}

struct Subscriber {
    id: NotifyId,
    prefix: String,
    callback: NotifyCallback,
}

struct RegistryInner {
    values: HashMap<String, SettingValue>,
    subscribers: Vec<Subscriber>,
    next_notify_id: u64,
}

pub struct CoreSettingsRegistry {
    storage_path: Option<PathBuf>,
    inner: Mutex<RegistryInner>,
}

impl CoreSettingsRegistry {
    /*
     * Creates a registry persisted at `storage_path`, loading any existing
     * file. A missing file starts an empty registry; a malformed file is
     * logged and ignored so a damaged settings file never prevents startup.
     * Passing `None` yields a purely in-memory registry.
     */
    pub fn new(storage_path: Option<PathBuf>) -> Self {
        let values = match &storage_path {
            Some(path) if path.exists() => match Self::load_values(path) {
                Ok(values) => {
                    log::debug!(
                        "CoreSettingsRegistry: Loaded {} entries from {path:?}",
                        values.len()
                    );
                    values
                }
                Err(e) => {
                    log::warn!(
                        "CoreSettingsRegistry: Could not load settings file {path:?}, starting empty: {e}"
                    );
                    HashMap::new()
                }
            },
            _ => HashMap::new(),
        };
        CoreSettingsRegistry {
            storage_path,
            inner: Mutex::new(RegistryInner {
                values,
                subscribers: Vec::new(),
                next_notify_id: 1,
            }),
        }
    }

    /// An in-memory registry with no backing file, for tests and fallbacks.
    pub fn in_memory() -> Self {
        CoreSettingsRegistry::new(None)
    }

    fn load_values(path: &PathBuf) -> Result<HashMap<String, SettingValue>> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        Ok(serde_json::from_reader(reader)?)
    }

    fn persist(storage_path: &Option<PathBuf>, values: &HashMap<String, SettingValue>) -> Result<()> {
        let Some(path) = storage_path else {
            return Ok(());
        };
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, values)?;
        log::trace!("CoreSettingsRegistry: Persisted {} entries to {path:?}", values.len());
        Ok(())
    }

    // A subscription prefix matches the written path itself and anything
    // below it in the hierarchy.
    fn prefix_matches(prefix: &str, path: &str) -> bool {
        path == prefix || (path.starts_with(prefix) && path[prefix.len()..].starts_with('/'))
    }
}

impl SettingsRegistryOperations for CoreSettingsRegistry {
    fn read(&self, path: &str) -> Result<Option<SettingValue>> {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        Ok(inner.values.get(path).cloned())
    }

    /*
     * Creates or overwrites the entry at `path`, persists the registry, and
     * then dispatches change notifications to every subscriber whose prefix
     * covers the path. Callbacks run outside the registry lock so they may
     * read the registry themselves.
     */
    fn write(&self, path: &str, value: SettingValue) -> Result<()> {
        let matching: Vec<NotifyCallback>;
        {
            let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            inner.values.insert(path.to_string(), value.clone());
            Self::persist(&self.storage_path, &inner.values)?;
            matching = inner
                .subscribers
                .iter()
                .filter(|s| Self::prefix_matches(&s.prefix, path))
                .map(|s| s.callback.clone())
                .collect();
        }
        for callback in matching {
            callback(path, &value);
        }
        Ok(())
    }

    fn add_notify(&self, prefix: &str, callback: NotifyCallback) -> NotifyId {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let id = NotifyId(inner.next_notify_id);
        inner.next_notify_id += 1;
        inner.subscribers.push(Subscriber {
            id,
            prefix: prefix.trim_end_matches('/').to_string(),
            callback,
        });
        log::trace!("CoreSettingsRegistry: Added notify {id:?} for prefix '{prefix}'");
        id
    }

    fn remove_notify(&self, id: NotifyId) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let before = inner.subscribers.len();
        inner.subscribers.retain(|s| s.id != id);
        if inner.subscribers.len() == before {
            log::debug!("CoreSettingsRegistry: remove_notify for unknown id {id:?}");
        }
    }
}
