//! Reminder persistence.
//!
//! [`ReminderStore`] is the CRUD contract the scheduler reads from. The real
//! application backs it with a hosted database; this crate ships an
//! in-memory store for tests and embedding, and [`JsonReminderStore`], which
//! keeps reminders in `reminders.json` under the data directory.

use crate::error::{NudgeError, Result};
use crate::last_fired::LastFiredStore;
use crate::reminder::Reminder;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// CRUD access to reminder records.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// All reminders, enabled or not.
    async fn list_reminders(&self) -> Result<Vec<Reminder>>;

    /// Insert or replace by id.
    async fn save_reminder(&self, reminder: Reminder) -> Result<()>;

    /// Remove by id. Removing an unknown id is not an error.
    async fn delete_reminder(&self, id: &str) -> Result<()>;
}

/// Delete a reminder together with its last-fired entry.
///
/// The record is deleted first; a failure to drop the history entry is
/// logged and returned, leaving only a harmless orphan timestamp behind.
pub async fn delete_reminder_with_history(
    store: &dyn ReminderStore,
    last_fired: &dyn LastFiredStore,
    id: &str,
) -> Result<()> {
    store.delete_reminder(id).await?;
    last_fired.remove(id).inspect_err(|e| {
        warn!(reminder_id = id, "reminder deleted but last-fired entry remains: {e}");
    })
}

fn upsert(reminders: &mut Vec<Reminder>, reminder: Reminder) {
    if let Some(existing) = reminders.iter_mut().find(|r| r.id == reminder.id) {
        *existing = reminder;
    } else {
        reminders.push(reminder);
    }
}

/// Process-local reminder store.
#[derive(Debug, Default)]
pub struct InMemoryReminderStore {
    reminders: Mutex<Vec<Reminder>>,
}

impl InMemoryReminderStore {
    pub fn new(reminders: Vec<Reminder>) -> Self {
        Self {
            reminders: Mutex::new(reminders),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<Reminder>>> {
        self.reminders
            .lock()
            .map_err(|_| NudgeError::Store("reminder store lock poisoned".to_owned()))
    }
}

#[async_trait]
impl ReminderStore for InMemoryReminderStore {
    async fn list_reminders(&self) -> Result<Vec<Reminder>> {
        Ok(self.lock()?.clone())
    }

    async fn save_reminder(&self, reminder: Reminder) -> Result<()> {
        let mut reminders = self.lock()?;
        upsert(&mut reminders, reminder);
        Ok(())
    }

    async fn delete_reminder(&self, id: &str) -> Result<()> {
        self.lock()?.retain(|r| r.id != id);
        Ok(())
    }
}

/// On-disk layout of `reminders.json`.
#[derive(Debug, Default, Serialize, Deserialize)]
struct ReminderFile {
    #[serde(default = "default_file_version")]
    version: u8,
    #[serde(default)]
    reminders: Vec<Reminder>,
}

fn default_file_version() -> u8 {
    1
}

/// JSON-file reminder store. Every call re-reads the file so edits made by
/// another process are picked up on the next tick.
#[derive(Debug)]
pub struct JsonReminderStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonReminderStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// `reminders.json` in the default data directory.
    pub fn default_path() -> PathBuf {
        crate::nudge_dirs::data_dir().join("reminders.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Vec<Reminder>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("no reminders file at {}", self.path.display());
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(NudgeError::Store(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )));
            }
        };
        let file: ReminderFile = serde_json::from_slice(&bytes).map_err(|e| {
            NudgeError::Store(format!("failed to parse {}: {e}", self.path.display()))
        })?;
        Ok(file.reminders)
    }

    fn store(&self, reminders: Vec<Reminder>) -> Result<()> {
        let file = ReminderFile {
            version: default_file_version(),
            reminders,
        };
        let json = serde_json::to_vec_pretty(&file)?;
        crate::last_fired::write_atomically(&self.path, &json)
    }

    fn modify(&self, f: impl FnOnce(&mut Vec<Reminder>)) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| NudgeError::Store("reminder file lock poisoned".to_owned()))?;
        let mut reminders = self.load()?;
        f(&mut reminders);
        self.store(reminders)
    }
}

#[async_trait]
impl ReminderStore for JsonReminderStore {
    async fn list_reminders(&self) -> Result<Vec<Reminder>> {
        self.load()
    }

    async fn save_reminder(&self, reminder: Reminder) -> Result<()> {
        self.modify(|reminders| upsert(reminders, reminder))
    }

    async fn delete_reminder(&self, id: &str) -> Result<()> {
        self.modify(|reminders| reminders.retain(|r| r.id != id))
    }
}
