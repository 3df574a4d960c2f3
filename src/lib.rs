//! Nudge: reminder scheduling and notification delivery.
//!
//! Users attach reminders to habits (plus an optional built-in hydration
//! reminder). Each reminder has a frequency, a daily active window and a set
//! of active weekdays. This crate decides when each reminder fires and gets
//! the notification in front of the user.
//!
//! # Architecture
//!
//! - **Engine** ([`engine`]): pure fire decision and forward projection
//! - **Foreground scheduler** ([`scheduler`]): polls every tick while the
//!   app is active, delivers, records last-fired times
//! - **Background timer host** ([`background`]): arms one-shot timers from
//!   a precomputed batch so reminders keep firing when polling stops
//! - **Delivery** ([`delivery`]): permission gate and channel fallback chain
//!
//! The scheduler hands a fresh [`notification::PendingFireBatch`] to the host
//! on a fixed cadence; each batch replaces the previous one.

pub mod background;
pub mod clock;
pub mod config;
pub mod content;
pub mod delivery;
pub mod engine;
pub mod error;
pub mod last_fired;
pub mod notification;
pub mod nudge_dirs;
pub mod reminder;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod test_utils;

pub use background::{BackgroundHostHandle, BackgroundTimerHost, HostConfig, HostSpawner};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::NudgeConfig;
pub use delivery::{DeliveryChannelSelector, DeliveryOutcome, Permission};
pub use engine::{FireDecision, evaluate, should_fire, upcoming_fires};
pub use error::{NudgeError, Result};
pub use notification::{NotificationEvent, PendingFire, PendingFireBatch};
pub use reminder::{Reminder, ReminderStore, ScheduleError};
pub use scheduler::{ForegroundScheduler, PassReport};
