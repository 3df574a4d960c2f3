//! Error types for the reminder subsystem.

use crate::reminder::ScheduleError;

/// Top-level error type for scheduling and delivery.
#[derive(Debug, thiserror::Error)]
pub enum NudgeError {
    /// Configuration file could not be parsed or serialized.
    #[error("config error: {0}")]
    Config(String),

    /// Reminder or last-fired persistence error.
    #[error("store error: {0}")]
    Store(String),

    /// Reminder schedule failed validation.
    #[error("schedule error: {0}")]
    Schedule(#[from] ScheduleError),

    /// A delivery channel failed to show a notification.
    #[error("delivery error: {0}")]
    Delivery(String),

    /// Background timer host is gone or did not answer.
    #[error("timer host error: {0}")]
    Host(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encode/decode error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, NudgeError>;
