//! Local notification primitives.
//!
//! A [`DirectNotifier`] is whatever the current process can use to put a
//! notification in front of the user. Both the foreground's direct channel
//! and the background host deliver through one.

use crate::error::{NudgeError, Result};
use crate::notification::NotificationEvent;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Default lifetime of a transient notification.
pub const DEFAULT_AUTO_DISMISS: Duration = Duration::from_secs(8);

/// Called when the user clicks a notification; brings the caller's context
/// to the front.
pub type FocusCallback = Arc<dyn Fn() + Send + Sync>;

/// Identifier of a displayed notification, scoped to its notifier.
pub type NoticeId = u64;

/// Result of asking a notifier to show an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowResult {
    Shown(NoticeId),
    /// The notifier recognised the dedupe key and did not show it again.
    Collapsed,
}

#[async_trait]
pub trait DirectNotifier: Send + Sync {
    /// Display `event`. `on_click` runs if the user activates it.
    async fn show(
        &self,
        event: &NotificationEvent,
        on_click: Option<FocusCallback>,
    ) -> Result<ShowResult>;

    /// Remove a displayed notification. Unknown ids are ignored.
    async fn dismiss(&self, id: NoticeId);

    /// Whether the platform removes notifications on its own.
    fn auto_dismisses(&self) -> bool {
        false
    }
}

/// Show `event` and, if the notifier does not, dismiss it after
/// `dismiss_after`.
pub async fn show_transient(
    notifier: &Arc<dyn DirectNotifier>,
    event: &NotificationEvent,
    on_click: Option<FocusCallback>,
    dismiss_after: Duration,
) -> Result<ShowResult> {
    let result = notifier.show(event, on_click).await?;
    if let ShowResult::Shown(id) = result {
        if !notifier.auto_dismisses() {
            let notifier = Arc::clone(notifier);
            tokio::spawn(async move {
                tokio::time::sleep(dismiss_after).await;
                notifier.dismiss(id).await;
            });
        }
    }
    Ok(result)
}

/// Writes notifications to the log. Used by headless hosts.
#[derive(Debug, Default)]
pub struct TracingNotifier {
    next_id: Mutex<NoticeId>,
}

#[async_trait]
impl DirectNotifier for TracingNotifier {
    async fn show(
        &self,
        event: &NotificationEvent,
        _on_click: Option<FocusCallback>,
    ) -> Result<ShowResult> {
        let id = {
            let mut next = match self.next_id.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            *next += 1;
            *next
        };
        info!(
            reminder_id = %event.reminder_id,
            tag = %event.tag,
            dedupe_key = %event.dedupe_key,
            "notification {}: {}",
            event.title,
            event.body
        );
        Ok(ShowResult::Shown(id))
    }

    async fn dismiss(&self, _id: NoticeId) {}

    fn auto_dismisses(&self) -> bool {
        true
    }
}

/// What a [`ChannelNotifier`] reports to its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeUpdate {
    Shown {
        id: NoticeId,
        event: NotificationEvent,
    },
    Dismissed {
        id: NoticeId,
    },
}

/// Number of recent dedupe keys a [`ChannelNotifier`] remembers.
const RECENT_KEY_CAPACITY: usize = 128;

struct ChannelNotifierState {
    next_id: NoticeId,
    recent_keys: VecDeque<String>,
    /// Currently visible notices, with their tag and click handler.
    visible: HashMap<NoticeId, (String, Option<FocusCallback>)>,
}

/// Forwards notifications over an mpsc channel to a UI layer.
///
/// Supports native dedupe: an event whose `dedupe_key` was shown recently is
/// collapsed, and a new event replaces any visible notice with the same tag.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<NoticeUpdate>,
    state: Mutex<ChannelNotifierState>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::UnboundedSender<NoticeUpdate>) -> Self {
        Self {
            tx,
            state: Mutex::new(ChannelNotifierState {
                next_id: 0,
                recent_keys: VecDeque::new(),
                visible: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ChannelNotifierState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Report a user click on `id`, running its focus callback.
    pub fn click(&self, id: NoticeId) -> bool {
        let callback = self.lock().visible.get(&id).and_then(|(_, cb)| cb.clone());
        match callback {
            Some(cb) => {
                cb();
                true
            }
            None => false,
        }
    }

    pub fn visible_count(&self) -> usize {
        self.lock().visible.len()
    }
}

#[async_trait]
impl DirectNotifier for ChannelNotifier {
    async fn show(
        &self,
        event: &NotificationEvent,
        on_click: Option<FocusCallback>,
    ) -> Result<ShowResult> {
        let (id, replaced) = {
            let mut state = self.lock();
            if state.recent_keys.iter().any(|k| *k == event.dedupe_key) {
                debug!(dedupe_key = %event.dedupe_key, "collapsing duplicate notification");
                return Ok(ShowResult::Collapsed);
            }
            state.recent_keys.push_back(event.dedupe_key.clone());
            if state.recent_keys.len() > RECENT_KEY_CAPACITY {
                state.recent_keys.pop_front();
            }

            let replaced: Vec<NoticeId> = state
                .visible
                .iter()
                .filter(|(_, (tag, _))| *tag == event.tag)
                .map(|(id, _)| *id)
                .collect();
            for old in &replaced {
                state.visible.remove(old);
            }

            state.next_id += 1;
            let id = state.next_id;
            state.visible.insert(id, (event.tag.clone(), on_click));
            (id, replaced)
        };

        for old in replaced {
            let _ = self.tx.send(NoticeUpdate::Dismissed { id: old });
        }
        self.tx
            .send(NoticeUpdate::Shown {
                id,
                event: event.clone(),
            })
            .map_err(|_| {
                self.lock().visible.remove(&id);
                NudgeError::Delivery("notification consumer closed".to_owned())
            })?;
        Ok(ShowResult::Shown(id))
    }

    async fn dismiss(&self, id: NoticeId) {
        let removed = self.lock().visible.remove(&id).is_some();
        if removed && self.tx.send(NoticeUpdate::Dismissed { id }).is_err() {
            warn!("notification consumer closed before dismiss of {id}");
        }
    }
}
