//! Background timer host.
//!
//! A detached tokio task that keeps firing reminders when the foreground
//! loop is not running. It knows nothing about schedules: it receives a
//! [`PendingFireBatch`] of absolute instants, arms one timer per instant and
//! shows the attached event when a timer elapses.
//!
//! # Handoff semantics
//!
//! Each [`BackgroundHostHandle::schedule`] call replaces everything the host
//! holds. Timers from the previous batch are aborted before the new batch is
//! armed, so a recomputed batch never stacks on a stale one.
//!
//! # Duplicate suppression
//!
//! The host remembers the `dedupe_key` of recent deliveries, whether they
//! came from an elapsed timer or from [`BackgroundHostHandle::display`]. A
//! second event for the same firing slot is dropped, so a foreground that
//! delivers through the host and a timer armed for the same slot show one
//! notification between them.
//!
//! # Lifetime
//!
//! The host stops when [`BackgroundHostHandle::shutdown`] is called, when
//! every handle is dropped, or when its task is aborted. All armed timers
//! die with it. A re-spawned host starts empty.

mod resolver;
pub mod stdio;

pub use resolver::HostSpawner;

use crate::clock::Clock;
use crate::delivery::direct::{DEFAULT_AUTO_DISMISS, DirectNotifier, show_transient};
use crate::error::{NudgeError, Result};
use crate::notification::{NotificationEvent, PendingFire, PendingFireBatch};
use chrono::Duration as ChronoDuration;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Longest lead time the host will arm a timer for, in hours.
pub const DEFAULT_HORIZON_HOURS: i64 = 24;

/// How long a handle waits for the host to answer a request.
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

/// Number of delivered dedupe keys the host remembers.
const RECENT_KEY_CAPACITY: usize = 256;

/// Host tuning.
#[derive(Debug, Clone, Copy)]
pub struct HostConfig {
    /// Entries further out than this are dropped.
    pub horizon: ChronoDuration,
    /// Lifetime of notifications the host shows.
    pub dismiss_after: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            horizon: ChronoDuration::hours(DEFAULT_HORIZON_HOURS),
            dismiss_after: DEFAULT_AUTO_DISMISS,
        }
    }
}

/// Snapshot of host state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostStatus {
    /// Timers armed and not yet elapsed.
    pub armed: usize,
    /// Batches received since the host started.
    pub batches_received: u64,
    /// Timers that elapsed and ran their delivery.
    pub fired: u64,
    /// Deliveries dropped because their firing slot was already shown.
    pub suppressed: u64,
}

/// Dedupe keys of recent host deliveries, oldest first.
#[derive(Debug, Default)]
struct RecentDeliveries {
    keys: VecDeque<String>,
    suppressed: u64,
}

impl RecentDeliveries {
    /// Record `key`. Returns `false` if it was delivered recently.
    fn claim(&mut self, key: &str) -> bool {
        if self.keys.iter().any(|k| k == key) {
            self.suppressed += 1;
            return false;
        }
        self.keys.push_back(key.to_owned());
        if self.keys.len() > RECENT_KEY_CAPACITY {
            self.keys.pop_front();
        }
        true
    }
}

fn claim(recent: &Mutex<RecentDeliveries>, key: &str) -> bool {
    match recent.lock() {
        Ok(mut guard) => guard.claim(key),
        Err(poisoned) => poisoned.into_inner().claim(key),
    }
}

enum HostCommand {
    Schedule(PendingFireBatch),
    Display {
        event: NotificationEvent,
        reply: oneshot::Sender<Result<()>>,
    },
    Status(oneshot::Sender<HostStatus>),
    Shutdown,
}

/// Cloneable handle for talking to a running host.
#[derive(Clone)]
pub struct BackgroundHostHandle {
    tx: mpsc::UnboundedSender<HostCommand>,
}

impl std::fmt::Debug for BackgroundHostHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundHostHandle")
            .field("reachable", &self.is_reachable())
            .finish()
    }
}

impl BackgroundHostHandle {
    /// Hand off a batch, replacing all previously armed timers.
    pub fn schedule(&self, batch: PendingFireBatch) -> Result<()> {
        self.tx
            .send(HostCommand::Schedule(batch))
            .map_err(|_| NudgeError::Host("timer host is gone".to_owned()))
    }

    /// Ask the host to show `event` now through its own notifier.
    pub async fn display(&self, event: NotificationEvent) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(HostCommand::Display { event, reply })
            .map_err(|_| NudgeError::Host("timer host is gone".to_owned()))?;
        match tokio::time::timeout(REPLY_TIMEOUT, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(NudgeError::Host(
                "timer host dropped display request".to_owned(),
            )),
            Err(_) => Err(NudgeError::Host("timer host did not answer".to_owned())),
        }
    }

    pub async fn status(&self) -> Result<HostStatus> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(HostCommand::Status(reply))
            .map_err(|_| NudgeError::Host("timer host is gone".to_owned()))?;
        match tokio::time::timeout(REPLY_TIMEOUT, rx).await {
            Ok(Ok(status)) => Ok(status),
            Ok(Err(_)) => Err(NudgeError::Host("timer host stopped".to_owned())),
            Err(_) => Err(NudgeError::Host("timer host did not answer".to_owned())),
        }
    }

    /// Tear the host down, cancelling every armed timer.
    pub fn shutdown(&self) {
        let _ = self.tx.send(HostCommand::Shutdown);
    }

    /// `false` once the host task has exited.
    pub fn is_reachable(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// The host task's state. Construct through [`BackgroundTimerHost::spawn`].
pub struct BackgroundTimerHost {
    notifier: Arc<dyn DirectNotifier>,
    clock: Arc<dyn Clock>,
    config: HostConfig,
    rx: mpsc::UnboundedReceiver<HostCommand>,
    timers: JoinSet<()>,
    recent: Arc<Mutex<RecentDeliveries>>,
    batches_received: u64,
    fired: u64,
}

impl BackgroundTimerHost {
    /// Spawn a fresh host on the current tokio runtime.
    pub fn spawn(
        notifier: Arc<dyn DirectNotifier>,
        clock: Arc<dyn Clock>,
        config: HostConfig,
    ) -> (BackgroundHostHandle, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let host = Self {
            notifier,
            clock,
            config,
            rx,
            timers: JoinSet::new(),
            recent: Arc::new(Mutex::new(RecentDeliveries::default())),
            batches_received: 0,
            fired: 0,
        };
        let task = tokio::spawn(host.run());
        (BackgroundHostHandle { tx }, task)
    }

    async fn run(mut self) {
        info!("background timer host started");
        loop {
            tokio::select! {
                cmd = self.rx.recv() => match cmd {
                    Some(HostCommand::Schedule(batch)) => self.replace_batch(batch),
                    Some(HostCommand::Display { event, reply }) => {
                        let result = if claim(&self.recent, &event.dedupe_key) {
                            show_transient(&self.notifier, &event, None, self.config.dismiss_after)
                                .await
                                .map(|_| ())
                        } else {
                            debug!(dedupe_key = %event.dedupe_key, "display already delivered");
                            Ok(())
                        };
                        let _ = reply.send(result);
                    }
                    Some(HostCommand::Status(reply)) => {
                        let _ = reply.send(self.status());
                    }
                    Some(HostCommand::Shutdown) | None => break,
                },
                Some(joined) = self.timers.join_next(), if !self.timers.is_empty() => {
                    match joined {
                        Ok(()) => self.fired += 1,
                        Err(e) if e.is_cancelled() => {}
                        Err(e) => warn!("background timer task failed: {e}"),
                    }
                }
            }
        }
        self.timers.abort_all();
        info!("background timer host torn down");
    }

    fn status(&self) -> HostStatus {
        let suppressed = match self.recent.lock() {
            Ok(guard) => guard.suppressed,
            Err(poisoned) => poisoned.into_inner().suppressed,
        };
        HostStatus {
            armed: self.timers.len(),
            batches_received: self.batches_received,
            fired: self.fired,
            suppressed,
        }
    }

    fn replace_batch(&mut self, batch: PendingFireBatch) {
        self.batches_received += 1;
        let superseded = self.timers.len();
        self.timers.abort_all();
        // Aborted tasks stay in the set until joined; start a fresh one so
        // `armed` only counts the new batch.
        self.timers = JoinSet::new();

        let now = self.clock.now();
        let mut armed = 0usize;
        for fire in batch.fires {
            let lead = fire.fire_at - now;
            if lead <= ChronoDuration::zero() || lead > self.config.horizon {
                debug!(
                    reminder_id = %fire.reminder_id,
                    fire_at = %fire.fire_at,
                    "dropping fire outside the timer horizon"
                );
                continue;
            }
            let Ok(delay) = lead.to_std() else {
                continue;
            };
            self.arm(fire, delay);
            armed += 1;
        }
        debug!(superseded, armed, "background batch replaced");
    }

    fn arm(&mut self, fire: PendingFire, delay: Duration) {
        let notifier = Arc::clone(&self.notifier);
        let recent = Arc::clone(&self.recent);
        let dismiss_after = self.config.dismiss_after;
        self.timers.spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(reminder_id = %fire.reminder_id, "background timer elapsed");
            if !claim(&recent, &fire.event.dedupe_key) {
                debug!(dedupe_key = %fire.event.dedupe_key, "firing already delivered");
                return;
            }
            if let Err(e) = show_transient(&notifier, &fire.event, None, dismiss_after).await {
                warn!(reminder_id = %fire.reminder_id, "background delivery failed: {e}");
            }
        });
    }
}
