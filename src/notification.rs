//! Notification payloads and the foreground→background handoff batch.

use crate::content::NotificationContent;
use crate::error::Result;
use crate::reminder::ReminderId;
use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

/// A notification ready for delivery.
///
/// Delivery is **at-least-once**. The foreground loop and a stale
/// background timer can both deliver the same logical firing near a
/// handoff. `tag` is stable per reminder so channels with replace-by-tag
/// semantics show a single notification; `dedupe_key` identifies the
/// firing itself (reminder plus minute slot) for channels that can
/// suppress exact repeats. Channels that support neither may show a
/// duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub reminder_id: ReminderId,
    pub title: String,
    pub body: String,
    pub tag: String,
    pub dedupe_key: String,
}

impl NotificationEvent {
    /// Build the event for `reminder_id` firing at `fire_at`.
    pub fn for_firing(
        reminder_id: &str,
        content: NotificationContent,
        fire_at: DateTime<Utc>,
    ) -> Self {
        Self {
            reminder_id: reminder_id.to_owned(),
            title: content.title,
            body: content.body,
            tag: tag_for(reminder_id),
            dedupe_key: dedupe_key_for(reminder_id, fire_at),
        }
    }

    /// Ad-hoc event outside any schedule, e.g. a "test notification" button.
    pub fn manual(title: impl Into<String>, body: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            reminder_id: "manual".to_owned(),
            title: title.into(),
            body: body.into(),
            tag: "nudge-manual".to_owned(),
            dedupe_key: format!("manual@{}", now.timestamp_millis()),
        }
    }
}

/// Channel tag shared by every firing of one reminder.
pub fn tag_for(reminder_id: &str) -> String {
    format!("nudge-{reminder_id}")
}

/// Dedupe key for one firing: reminder id plus the minute it belongs to.
pub fn dedupe_key_for(reminder_id: &str, fire_at: DateTime<Utc>) -> String {
    let slot = fire_at.timestamp().div_euclid(60) * 60;
    format!("{reminder_id}@{slot}")
}

/// One precomputed future firing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFire {
    pub reminder_id: ReminderId,
    pub fire_at: DateTime<FixedOffset>,
    pub event: NotificationEvent,
}

/// Everything the background host should fire until the next handoff.
///
/// A batch always replaces the previous one in full.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingFireBatch {
    /// When the foreground computed this batch.
    pub generated_at: Option<DateTime<FixedOffset>>,
    pub fires: Vec<PendingFire>,
}

impl PendingFireBatch {
    pub fn new(generated_at: DateTime<FixedOffset>, mut fires: Vec<PendingFire>) -> Self {
        fires.sort_by_key(|f| f.fire_at);
        Self {
            generated_at: Some(generated_at),
            fires,
        }
    }

    /// A batch that clears every armed timer.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.fires.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fires.is_empty()
    }

    /// Encode as a single-line JSON message.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(line: &str) -> Result<Self> {
        Ok(serde_json::from_str(line)?)
    }
}
