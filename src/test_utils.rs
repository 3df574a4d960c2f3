//! Shared test utilities used across multiple test modules.

use crate::delivery::direct::{DirectNotifier, FocusCallback, NoticeId, ShowResult};
use crate::error::{NudgeError, Result};
use crate::last_fired::{InMemoryLastFiredIndex, LastFiredStore};
use crate::notification::NotificationEvent;
use crate::reminder::ReminderId;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// `hh:mm` on Monday 2024-06-03, UTC offset.
pub fn monday_at(hour: u32, minute: u32) -> DateTime<FixedOffset> {
    FixedOffset::east_opt(0)
        .expect("zero offset")
        .with_ymd_and_hms(2024, 6, 3, hour, minute, 0)
        .single()
        .expect("valid test instant")
}

/// Notifier that remembers everything it was asked to show.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    shown: Mutex<Vec<NotificationEvent>>,
    dismissed: Mutex<Vec<NoticeId>>,
    next_id: AtomicU64,
    fail: bool,
}

impl RecordingNotifier {
    /// A notifier whose `show` always errors.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn shown(&self) -> Vec<NotificationEvent> {
        self.shown.lock().expect("shown lock").clone()
    }

    pub fn shown_ids(&self) -> Vec<String> {
        self.shown().into_iter().map(|e| e.reminder_id).collect()
    }

    pub fn dismissed(&self) -> Vec<NoticeId> {
        self.dismissed.lock().expect("dismissed lock").clone()
    }
}

#[async_trait]
impl DirectNotifier for RecordingNotifier {
    async fn show(
        &self,
        event: &NotificationEvent,
        _on_click: Option<FocusCallback>,
    ) -> Result<ShowResult> {
        if self.fail {
            return Err(NudgeError::Delivery("notifier unavailable".to_owned()));
        }
        self.shown.lock().expect("shown lock").push(event.clone());
        Ok(ShowResult::Shown(self.next_id.fetch_add(1, Ordering::SeqCst)))
    }

    async fn dismiss(&self, id: NoticeId) {
        self.dismissed.lock().expect("dismissed lock").push(id);
    }
}

/// In-memory last-fired index whose writes fail for one reminder id.
#[derive(Debug, Default)]
pub struct FailingLastFired {
    inner: InMemoryLastFiredIndex,
    failing_id: String,
}

impl FailingLastFired {
    pub fn failing_writes_for(id: &str) -> Self {
        Self {
            inner: InMemoryLastFiredIndex::default(),
            failing_id: id.to_owned(),
        }
    }
}

impl LastFiredStore for FailingLastFired {
    fn get(&self, id: &str) -> Result<Option<DateTime<Utc>>> {
        self.inner.get(id)
    }

    fn record(&self, id: &str, at: DateTime<Utc>) -> Result<()> {
        if id == self.failing_id {
            return Err(NudgeError::Store("disk full".to_owned()));
        }
        self.inner.record(id, at)
    }

    fn remove(&self, id: &str) -> Result<()> {
        self.inner.remove(id)
    }

    fn snapshot(&self) -> Result<HashMap<ReminderId, DateTime<Utc>>> {
        self.inner.snapshot()
    }
}
