//! Building the batch handed to the background timer host.

use crate::content::NotificationContent;
use crate::engine::upcoming_fires;
use crate::notification::{NotificationEvent, PendingFire, PendingFireBatch};
use crate::reminder::{Reminder, ReminderId};
use chrono::{DateTime, Duration, FixedOffset, Utc};
use std::collections::HashMap;

/// Result of the handoff step of one pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffStatus {
    /// This pass was not a handoff pass.
    NotDue,
    /// No background host was reachable.
    NoHost,
    /// A batch with `fires` entries replaced the host's timers.
    Sent { fires: usize },
    /// The reminder list was unavailable, so the host keeps its previous
    /// batch.
    Withheld,
    Failed(String),
}

/// Project every reminder forward over `horizon` and wrap the result as a
/// replacement batch.
///
/// `compose` is called once per projected firing, so mixed styles vary
/// between entries just as they would when firing live.
pub fn build_batch(
    reminders: &[Reminder],
    last_fired: &HashMap<ReminderId, DateTime<Utc>>,
    now: DateTime<FixedOffset>,
    horizon: Duration,
    mut compose: impl FnMut(&Reminder) -> NotificationContent,
) -> PendingFireBatch {
    let mut fires = Vec::new();
    for reminder in reminders {
        let last = last_fired.get(&reminder.id).copied();
        for fire_at in upcoming_fires(reminder, now, last, horizon) {
            let event =
                NotificationEvent::for_firing(&reminder.id, compose(reminder), fire_at.to_utc());
            fires.push(PendingFire {
                reminder_id: reminder.id.clone(),
                fire_at,
                event,
            });
        }
    }
    PendingFireBatch::new(now, fires)
}
