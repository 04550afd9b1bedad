//! Key-value persistence adapter.
//!
//! Every piece of durable state is a JSON document stored under a string key.
//! Reads fail soft (a missing or unparsable entry yields the caller's
//! default) and writes never abort the calling operation: a failed write is
//! logged and the in-memory state carries on.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{LedgerError, Result};
use crate::period::Period;
use crate::saving::{self, Snapshot};

const STORAGE_PREFIX: &str = "tekstil-erp-v4";

pub fn data_key() -> String {
    format!("{}:data", STORAGE_PREFIX)
}

pub fn meta_key() -> String {
    format!("{}:meta", STORAGE_PREFIX)
}

pub fn fields_key(section: &str, period: Period) -> String {
    format!("{}:fields:{}:{}", STORAGE_PREFIX, period.key(), section)
}

pub fn rows_key(section: &str, period: Period) -> String {
    format!("{}:rows:{}:{}", STORAGE_PREFIX, period.key(), section)
}

pub fn order_key(section: &str, period: Period) -> String {
    format!("{}:order:{}:{}", STORAGE_PREFIX, period.key(), section)
}

pub fn deleted_key(section: &str, period: Period) -> String {
    format!("{}:deleted:{}:{}", STORAGE_PREFIX, period.key(), section)
}

/// String-keyed durable store.
pub trait KvStore: Send {
    fn get_raw(&self, key: &str) -> Option<String>;

    fn set_raw(&mut self, key: &str, value: String) -> Result<()>;

    /// Returns `true` once after another writer changed the underlying
    /// storage, reloading the in-memory view.
    fn poll_external_change(&mut self) -> bool {
        false
    }
}

/// Read `key` as JSON, falling back to `default` on absence or parse error.
pub fn load_json<T: DeserializeOwned>(store: &dyn KvStore, key: &str, default: T) -> T {
    match store.get_raw(key) {
        Some(text) => match serde_json::from_str(&text) {
            Ok(value) => value,
            Err(e) => {
                log::debug!("ignoring unparsable entry {}: {}", key, e);
                default
            }
        },
        None => default,
    }
}

/// Write `value` as JSON under `key`. Failures are logged and dropped.
pub fn save_json<T: Serialize + ?Sized>(store: &mut dyn KvStore, key: &str, value: &T) {
    let text = match serde_json::to_string(value) {
        Ok(text) => text,
        Err(e) => {
            log::warn!("failed to serialize {}: {}", key, e);
            return;
        }
    };

    if let Err(e) = store.set_raw(key, text) {
        log::warn!("failed to persist {}: {}", key, e);
    }
}

/// Volatile store, used by tests and dry runs.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvStore for MemoryStore {
    fn get_raw(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set_raw(&mut self, key: &str, value: String) -> Result<()> {
        self.entries.insert(key.to_string(), value);
        Ok(())
    }
}

/// Store backed by a single gzip-compressed snapshot file.
///
/// The whole map lives in memory; each write rewrites the file. Another
/// process writing the same file is noticed through its modification time,
/// and a write first merges in whatever that process stored, so writers of
/// different keys never erase each other.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Snapshot,
    seen_modified: Option<SystemTime>,
    /// An external change was merged during a write and not yet reported.
    unreported_change: bool,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`. An unreadable file is
    /// treated as empty.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            saving::load_snapshot(&path).unwrap_or_else(|e| {
                log::warn!("could not read {}: {}; starting empty", path.display(), e);
                Snapshot::new()
            })
        } else {
            Snapshot::new()
        };
        let seen_modified = modified_time(&path);

        FileStore {
            path,
            entries,
            seen_modified,
            unreported_change: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload the snapshot if another writer touched the file since we last saw it.
    fn reload_if_changed(&mut self) -> bool {
        let current = modified_time(&self.path);
        if current.is_none() || current == self.seen_modified {
            return false;
        }

        match saving::load_snapshot(&self.path) {
            Ok(entries) => {
                self.entries = entries;
                self.seen_modified = current;
                true
            }
            Err(e) => {
                log::warn!("external change to {} unreadable: {}", self.path.display(), e);
                false
            }
        }
    }
}

impl KvStore for FileStore {
    fn get_raw(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    fn set_raw(&mut self, key: &str, value: String) -> Result<()> {
        if self.reload_if_changed() {
            self.unreported_change = true;
        }
        self.entries.insert(key.to_string(), value);
        saving::save_snapshot(&self.entries, &self.path)
            .map_err(|e| LedgerError::Storage(format!("{}: {}", self.path.display(), e)))?;
        self.seen_modified = modified_time(&self.path);
        Ok(())
    }

    fn poll_external_change(&mut self) -> bool {
        let reloaded = self.reload_if_changed();
        reloaded || std::mem::take(&mut self.unreported_change)
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}
