//! Reminder schedule descriptors.
//!
//! A [`Reminder`] says *when* a nudge may fire: a [`Frequency`], an
//! [`ActiveWindow`] within the day and a set of active weekdays. It carries
//! no runtime state; the last-fired instant lives in the
//! [`LastFiredStore`](crate::last_fired::LastFiredStore) so that editing a
//! schedule does not reset its history.

pub mod store;

use crate::content::MessageStyle;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use store::{InMemoryReminderStore, JsonReminderStore, ReminderStore};

/// Opaque reminder identifier.
pub type ReminderId = String;

/// Fixed id of the synthetic hydration reminder.
pub const HYDRATION_REMINDER_ID: &str = "hydration";

/// Minutes in a day; window bounds must be strictly below this.
pub const MINUTES_PER_DAY: u16 = 1440;

/// Smallest custom interval accepted, in minutes.
pub const MIN_CUSTOM_INTERVAL_MINUTES: u32 = 5;

/// Largest custom interval accepted, in minutes.
pub const MAX_CUSTOM_INTERVAL_MINUTES: u32 = 480;

/// A reminder schedule that cannot be evaluated.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScheduleError {
    #[error("custom frequency has no interval")]
    MissingCustomInterval,

    #[error("custom interval {0} min is outside 5..=480")]
    CustomIntervalOutOfRange(u32),

    #[error("active window {start}..{end} ends before it starts (overnight windows are not supported)")]
    InvertedWindow { start: u16, end: u16 },

    #[error("minute of day {0} is outside 0..1440")]
    WindowOutOfRange(u16),

    #[error("active days must not be empty")]
    EmptyDays,

    #[error("weekday index {0} is outside 0..=6")]
    InvalidWeekday(u8),

    #[error("invalid time of day '{0}', expected HH:MM")]
    InvalidTimeOfDay(String),
}

/// What a reminder is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Target {
    /// A tracked habit, by habit id.
    Habit(String),
    /// The non-habit hydration reminder.
    Hydration,
}

/// How often a reminder may fire inside its active window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frequency {
    /// At most once per 24 hours.
    Once,
    #[serde(rename = "every_30_min")]
    Every30Min,
    #[serde(rename = "every_1h")]
    Every1h,
    #[serde(rename = "every_2h")]
    Every2h,
    #[serde(rename = "every_4h")]
    Every4h,
    /// User-chosen interval in minutes.
    Custom {
        #[serde(default)]
        minutes: Option<u32>,
    },
}

impl Frequency {
    /// Minimum spacing between two firings.
    pub fn interval(&self) -> Result<Duration, ScheduleError> {
        match self {
            Self::Once => Ok(Duration::hours(24)),
            Self::Every30Min => Ok(Duration::minutes(30)),
            Self::Every1h => Ok(Duration::hours(1)),
            Self::Every2h => Ok(Duration::hours(2)),
            Self::Every4h => Ok(Duration::hours(4)),
            Self::Custom { minutes: None } => Err(ScheduleError::MissingCustomInterval),
            Self::Custom { minutes: Some(m) } => {
                if (MIN_CUSTOM_INTERVAL_MINUTES..=MAX_CUSTOM_INTERVAL_MINUTES).contains(m) {
                    Ok(Duration::minutes(i64::from(*m)))
                } else {
                    Err(ScheduleError::CustomIntervalOutOfRange(*m))
                }
            }
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Once => f.write_str("once per day"),
            Self::Every30Min => f.write_str("every 30 minutes"),
            Self::Every1h => f.write_str("every hour"),
            Self::Every2h => f.write_str("every 2 hours"),
            Self::Every4h => f.write_str("every 4 hours"),
            Self::Custom { minutes: Some(m) } => write!(f, "every {m} minutes"),
            Self::Custom { minutes: None } => f.write_str("custom (no interval)"),
        }
    }
}

/// Inclusive minute-of-day range in which a reminder may fire.
///
/// Serialized as `"HH:MM"` strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveWindow {
    #[serde(with = "hhmm")]
    pub start: u16,
    #[serde(with = "hhmm")]
    pub end: u16,
}

impl ActiveWindow {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Build a window from hour/minute pairs.
    pub fn from_hm(start: (u16, u16), end: (u16, u16)) -> Self {
        Self::new(start.0 * 60 + start.1, end.0 * 60 + end.1)
    }

    /// The whole day, 00:00 through 23:59.
    pub fn all_day() -> Self {
        Self::new(0, MINUTES_PER_DAY - 1)
    }

    /// Whether `minute_of_day` lies in the window, both ends inclusive.
    pub fn contains(&self, minute_of_day: u16) -> bool {
        self.start <= minute_of_day && minute_of_day <= self.end
    }

    pub fn validate(&self) -> Result<(), ScheduleError> {
        for bound in [self.start, self.end] {
            if bound >= MINUTES_PER_DAY {
                return Err(ScheduleError::WindowOutOfRange(bound));
            }
        }
        if self.start > self.end {
            return Err(ScheduleError::InvertedWindow {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

impl fmt::Display for ActiveWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            format_time_of_day(self.start),
            format_time_of_day(self.end)
        )
    }
}

/// Set of weekdays, 0 = Sunday through 6 = Saturday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct DaySet(u8);

impl DaySet {
    const ALL_BITS: u8 = 0b0111_1111;

    pub fn all() -> Self {
        Self(Self::ALL_BITS)
    }

    pub fn empty() -> Self {
        Self(0)
    }

    /// Build from weekday indices.
    pub fn from_indices(indices: impl IntoIterator<Item = u8>) -> Result<Self, ScheduleError> {
        let mut bits = 0u8;
        for day in indices {
            if day > 6 {
                return Err(ScheduleError::InvalidWeekday(day));
            }
            bits |= 1 << day;
        }
        Ok(Self(bits))
    }

    /// Monday through Friday.
    pub fn weekdays() -> Self {
        Self(0b0011_1110)
    }

    pub fn contains(&self, day_from_sunday: u32) -> bool {
        day_from_sunday <= 6 && self.0 & (1 << day_from_sunday) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 & Self::ALL_BITS == 0
    }

    pub fn indices(&self) -> Vec<u8> {
        (0..7u8).filter(|d| self.0 & (1 << d) != 0).collect()
    }
}

impl TryFrom<Vec<u8>> for DaySet {
    type Error = ScheduleError;

    fn try_from(value: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_indices(value)
    }
}

impl From<DaySet> for Vec<u8> {
    fn from(value: DaySet) -> Self {
        value.indices()
    }
}

/// A user-configured reminder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: ReminderId,
    pub target: Target,
    /// Display name used when composing messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub enabled: bool,
    pub frequency: Frequency,
    pub active_window: ActiveWindow,
    pub active_days: DaySet,
    /// Message style override; falls back to the configured preference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<MessageStyle>,
}

impl Reminder {
    /// Create an enabled reminder active every day, with a fresh id.
    pub fn new(target: Target, frequency: Frequency, active_window: ActiveWindow) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target,
            label: None,
            enabled: true,
            frequency,
            active_window,
            active_days: DaySet::all(),
            style: None,
        }
    }

    /// The synthetic hydration reminder under its fixed id.
    pub fn hydration(frequency: Frequency, active_window: ActiveWindow, days: DaySet) -> Self {
        Self {
            id: HYDRATION_REMINDER_ID.to_owned(),
            target: Target::Hydration,
            label: Some("Drink water".to_owned()),
            enabled: true,
            frequency,
            active_window,
            active_days: days,
            style: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<ReminderId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_days(mut self, days: DaySet) -> Self {
        self.active_days = days;
        self
    }

    pub fn with_style(mut self, style: MessageStyle) -> Self {
        self.style = Some(style);
        self
    }

    pub fn interval(&self) -> Result<Duration, ScheduleError> {
        self.frequency.interval()
    }

    /// Check every schedule invariant.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        self.frequency.interval()?;
        self.active_window.validate()?;
        if self.active_days.is_empty() {
            return Err(ScheduleError::EmptyDays);
        }
        Ok(())
    }

    /// Label, or a name derived from the target.
    pub fn display_name(&self) -> String {
        if let Some(label) = &self.label {
            return label.clone();
        }
        match &self.target {
            Target::Habit(habit_id) => format!("habit {habit_id}"),
            Target::Hydration => "hydration".to_owned(),
        }
    }
}

/// Parse `"HH:MM"` into a minute of day.
pub fn parse_time_of_day(s: &str) -> Result<u16, ScheduleError> {
    let invalid = || ScheduleError::InvalidTimeOfDay(s.to_owned());
    let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
    let hour: u16 = h.parse().map_err(|_| invalid())?;
    let minute: u16 = m.parse().map_err(|_| invalid())?;
    if hour > 23 || minute > 59 {
        return Err(invalid());
    }
    Ok(hour * 60 + minute)
}

pub fn format_time_of_day(minute_of_day: u16) -> String {
    format!("{:02}:{:02}", minute_of_day / 60, minute_of_day % 60)
}

mod hhmm {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u16, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_time_of_day(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_time_of_day(&raw).map_err(serde::de::Error::custom)
    }
}
