//! Last-fired index: when each reminder most recently fired.
//!
//! Kept apart from the reminder records so a schedule edit does not reset
//! firing history. Only the foreground scheduler writes here; the background
//! timer host is never handed a [`LastFiredStore`].

use crate::error::{NudgeError, Result};
use crate::reminder::ReminderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Durable mapping from reminder id to last-fired instant.
pub trait LastFiredStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<DateTime<Utc>>>;

    /// Record that `id` fired at `at`, replacing any earlier value.
    fn record(&self, id: &str, at: DateTime<Utc>) -> Result<()>;

    /// Forget `id`. Only called when the reminder itself is deleted.
    fn remove(&self, id: &str) -> Result<()>;

    /// Every entry, for batch computations.
    fn snapshot(&self) -> Result<HashMap<ReminderId, DateTime<Utc>>>;
}

/// Volatile index, lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryLastFiredIndex {
    entries: Mutex<HashMap<ReminderId, DateTime<Utc>>>,
}

impl InMemoryLastFiredIndex {
    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ReminderId, DateTime<Utc>>>> {
        self.entries
            .lock()
            .map_err(|_| NudgeError::Store("last-fired index lock poisoned".to_owned()))
    }
}

impl LastFiredStore for InMemoryLastFiredIndex {
    fn get(&self, id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.lock()?.get(id).copied())
    }

    fn record(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        self.lock()?.insert(id.to_owned(), at);
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        self.lock()?.remove(id);
        Ok(())
    }

    fn snapshot(&self) -> Result<HashMap<ReminderId, DateTime<Utc>>> {
        Ok(self.lock()?.clone())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LastFiredFile {
    #[serde(default = "default_version")]
    version: u8,
    #[serde(default)]
    entries: HashMap<ReminderId, DateTime<Utc>>,
}

fn default_version() -> u8 {
    1
}

/// File-backed index, persisted as `last_fired.json`.
///
/// Entries are cached in memory after the first load; every `record` and
/// `remove` rewrites the file atomically. A failed write leaves the cache
/// unchanged so memory and disk stay in agreement.
#[derive(Debug)]
pub struct FileLastFiredIndex {
    path: PathBuf,
    cache: Mutex<HashMap<ReminderId, DateTime<Utc>>>,
}

impl FileLastFiredIndex {
    /// Open (or lazily create) the index at `path`.
    ///
    /// A malformed file is logged and treated as empty, which at worst lets
    /// each reminder fire once more than it otherwise would.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(bytes) => match serde_json::from_slice::<LastFiredFile>(&bytes) {
                Ok(file) => file.entries,
                Err(e) => {
                    warn!("ignoring malformed last-fired index at {}: {e}", path.display());
                    HashMap::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(NudgeError::Store(format!(
                    "failed to read last-fired index {}: {e}",
                    path.display()
                )));
            }
        };
        debug!(entries = entries.len(), "loaded last-fired index from {}", path.display());
        Ok(Self {
            path,
            cache: Mutex::new(entries),
        })
    }

    /// `last_fired.json` in the default data directory.
    pub fn default_path() -> PathBuf {
        crate::nudge_dirs::data_dir().join("last_fired.json")
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<ReminderId, DateTime<Utc>>>> {
        self.cache
            .lock()
            .map_err(|_| NudgeError::Store("last-fired index lock poisoned".to_owned()))
    }

    fn persist(&self, entries: &HashMap<ReminderId, DateTime<Utc>>) -> Result<()> {
        let file = LastFiredFile {
            version: default_version(),
            entries: entries.clone(),
        };
        let json = serde_json::to_vec_pretty(&file)?;
        write_atomically(&self.path, &json)
    }
}

impl LastFiredStore for FileLastFiredIndex {
    fn get(&self, id: &str) -> Result<Option<DateTime<Utc>>> {
        Ok(self.lock()?.get(id).copied())
    }

    fn record(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut cache = self.lock()?;
        let mut next = cache.clone();
        next.insert(id.to_owned(), at);
        self.persist(&next)?;
        *cache = next;
        Ok(())
    }

    fn remove(&self, id: &str) -> Result<()> {
        let mut cache = self.lock()?;
        if !cache.contains_key(id) {
            return Ok(());
        }
        let mut next = cache.clone();
        next.remove(id);
        self.persist(&next)?;
        *cache = next;
        Ok(())
    }

    fn snapshot(&self) -> Result<HashMap<ReminderId, DateTime<Utc>>> {
        Ok(self.lock()?.clone())
    }
}

/// Write `bytes` to `path` through a sibling temp file and rename.
pub(crate) fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            NudgeError::Store(format!("failed to create {}: {e}", parent.display()))
        })?;
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, bytes).map_err(|e| {
        NudgeError::Store(format!("failed to write {}: {e}", tmp_path.display()))
    })?;
    std::fs::rename(&tmp_path, path).map_err(|e| {
        NudgeError::Store(format!("failed to finalize {}: {e}", path.display()))
    })?;
    Ok(())
}
