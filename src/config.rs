//! Configuration for the reminder daemon.

use crate::content::{StylePreference, StyleWeights};
use crate::delivery::Permission;
use crate::reminder::{ActiveWindow, DaySet, Frequency, Reminder};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NudgeConfig {
    /// Foreground loop and handoff timing.
    pub scheduler: SchedulerConfig,
    /// Delivery channel settings.
    pub delivery: DeliveryConfig,
    /// Message wording.
    pub content: ContentConfig,
    /// The built-in hydration reminder.
    pub hydration: HydrationConfig,
    /// File locations.
    pub storage: StorageConfig,
}

/// Foreground scheduler timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Seconds between evaluation passes.
    pub tick_secs: u64,
    /// Push a fresh batch to the background host every N passes.
    pub handoff_every_ticks: u32,
    /// How far ahead the handoff batch reaches, in hours. Capped by the
    /// host's own 24 h horizon.
    pub handoff_horizon_hours: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_secs: 60,
            handoff_every_ticks: 1,
            handoff_horizon_hours: 24,
        }
    }
}

/// Delivery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Seconds before a directly shown notification is dismissed.
    pub auto_dismiss_secs: u64,
    /// Notification permission recorded for this installation.
    ///
    /// Starts as `default` (never asked); `nudge permit` flips it to
    /// `granted`.
    pub permission: Permission,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            auto_dismiss_secs: 8,
            permission: Permission::Default,
        }
    }
}

/// Message style settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    pub style: StylePreference,
    /// Weights used when `style = "mixed"`.
    pub weights: StyleWeights,
}

/// Hydration reminder settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HydrationConfig {
    pub enabled: bool,
    pub frequency: Frequency,
    pub window: ActiveWindow,
    pub days: DaySet,
}

impl Default for HydrationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            frequency: Frequency::Every1h,
            window: ActiveWindow::from_hm((8, 0), (20, 0)),
            days: DaySet::all(),
        }
    }
}

impl HydrationConfig {
    /// The synthetic reminder these settings describe.
    ///
    /// Returned even when disabled, so the engine reports it as disabled
    /// rather than the reminder silently disappearing.
    pub fn to_reminder(&self) -> Reminder {
        let mut reminder = Reminder::hydration(self.frequency, self.window, self.days);
        reminder.enabled = self.enabled;
        reminder
    }
}

/// File location overrides.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub reminders_path: Option<PathBuf>,
    pub last_fired_path: Option<PathBuf>,
}

impl StorageConfig {
    pub fn reminders_path(&self) -> PathBuf {
        self.reminders_path
            .clone()
            .unwrap_or_else(crate::reminder::JsonReminderStore::default_path)
    }

    pub fn last_fired_path(&self) -> PathBuf {
        self.last_fired_path
            .clone()
            .unwrap_or_else(crate::last_fired::FileLastFiredIndex::default_path)
    }
}

impl NudgeConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if an
    /// enabled hydration reminder has a malformed schedule.
    pub fn from_file(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| crate::error::NudgeError::Config(e.to_string()))?;
        if config.hydration.enabled {
            config.hydration.to_reminder().validate()?;
        }
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise return defaults.
    pub fn load_or_default(path: &std::path::Path) -> crate::error::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    pub fn save_to_file(&self, path: &std::path::Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::NudgeError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Returns the default config file path: `<config_dir>/config.toml`.
    pub fn default_config_path() -> PathBuf {
        crate::nudge_dirs::config_dir().join("config.toml")
    }

    pub fn tick(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.scheduler.tick_secs.max(1))
    }

    pub fn handoff_horizon(&self) -> chrono::Duration {
        let hours = self
            .scheduler
            .handoff_horizon_hours
            .clamp(1, crate::background::DEFAULT_HORIZON_HOURS as u32);
        chrono::Duration::hours(i64::from(hours))
    }

    pub fn auto_dismiss(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.delivery.auto_dismiss_secs)
    }
}
