//! Foreground evaluation loop.
//!
//! While running, a tokio task evaluates every reminder once per tick,
//! delivers the ones that are due and records their firing time. Every
//! `handoff_every_ticks` passes it also recomputes the next day of firings
//! and hands them to the background timer host, so reminders keep firing
//! after the loop stops.
//!
//! While the loop is live, a handoff batch leaves out every firing the loop
//! itself will reach before the following handoff (plus one tick of slack),
//! so the host and the loop never both own the same firing. When the loop is
//! cancelled it sends one closing batch with nothing left out.

use crate::background::BackgroundHostHandle;
use crate::clock::{Clock, SystemClock};
use crate::content::{ContentStrategy, NotificationContent, PhraseBook, StylePicker};
use crate::delivery::{DeliveryChannelSelector, DeliveryOutcome};
use crate::engine::{FireDecision, evaluate};
use crate::last_fired::LastFiredStore;
use crate::notification::NotificationEvent;
use crate::reminder::{Reminder, ReminderId, ReminderStore, ScheduleError};
use crate::scheduler::handoff::{HandoffStatus, build_batch};
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Interval between evaluation passes (seconds).
const TICK_INTERVAL_SECS: u64 = 60;

/// A reminder that fired during a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FiredReminder {
    pub reminder_id: ReminderId,
    pub outcome: DeliveryOutcome,
}

/// What one evaluation pass did.
#[derive(Debug, Clone)]
pub struct PassReport {
    /// Clock reading the pass evaluated against.
    pub at: DateTime<FixedOffset>,
    /// Reminders considered, including the hydration reminder.
    pub evaluated: usize,
    pub fired: Vec<FiredReminder>,
    /// Reminders skipped because their schedule is malformed.
    pub misconfigured: Vec<(ReminderId, ScheduleError)>,
    /// Reminders whose last-fired value could not be read or written.
    pub persist_failures: Vec<(ReminderId, String)>,
    /// Set when the reminder store could not be listed.
    pub store_error: Option<String>,
    pub handoff: HandoffStatus,
}

impl PassReport {
    fn new(at: DateTime<FixedOffset>) -> Self {
        Self {
            at,
            evaluated: 0,
            fired: Vec::new(),
            misconfigured: Vec::new(),
            persist_failures: Vec::new(),
            store_error: None,
            handoff: HandoffStatus::NotDue,
        }
    }

    pub fn fired_ids(&self) -> Vec<&str> {
        self.fired.iter().map(|f| f.reminder_id.as_str()).collect()
    }
}

/// Everything a pass needs, shared between the handle and the loop task.
struct SchedulerCore {
    store: Arc<dyn ReminderStore>,
    last_fired: Arc<dyn LastFiredStore>,
    selector: Arc<DeliveryChannelSelector>,
    clock: Arc<dyn Clock>,
    content: Arc<dyn ContentStrategy>,
    styles: StylePicker,
    hydration: Option<Reminder>,
    background: Option<BackgroundHostHandle>,
    tick: Duration,
    handoff_every_ticks: u32,
    handoff_horizon: ChronoDuration,
    reports: Option<mpsc::UnboundedSender<PassReport>>,
    /// Serialises passes; holds the number of passes run so far.
    passes: tokio::sync::Mutex<u64>,
    /// Loop tasks currently ticking.
    live_loops: AtomicUsize,
}

struct RunningLoop {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Builder for [`ForegroundScheduler`].
pub struct SchedulerBuilder {
    store: Arc<dyn ReminderStore>,
    last_fired: Arc<dyn LastFiredStore>,
    selector: Arc<DeliveryChannelSelector>,
    clock: Arc<dyn Clock>,
    content: Arc<dyn ContentStrategy>,
    styles: StylePicker,
    hydration: Option<Reminder>,
    background: Option<BackgroundHostHandle>,
    tick: Duration,
    handoff_every_ticks: u32,
    handoff_horizon: ChronoDuration,
    reports: Option<mpsc::UnboundedSender<PassReport>>,
}

impl SchedulerBuilder {
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_content(mut self, content: Arc<dyn ContentStrategy>, styles: StylePicker) -> Self {
        self.content = content;
        self.styles = styles;
        self
    }

    /// Evaluate this synthetic reminder alongside the stored ones.
    ///
    /// A stored reminder with the same id is shadowed by it.
    pub fn with_hydration(mut self, reminder: Reminder) -> Self {
        self.hydration = Some(reminder);
        self
    }

    /// Host that receives handoff batches. Without one, the selector's
    /// attached worker is used.
    pub fn with_background(mut self, handle: BackgroundHostHandle) -> Self {
        self.background = Some(handle);
        self
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    /// Hand off every `every_ticks` passes, projecting `horizon` ahead.
    pub fn with_handoff(mut self, every_ticks: u32, horizon: ChronoDuration) -> Self {
        self.handoff_every_ticks = every_ticks.max(1);
        self.handoff_horizon = horizon;
        self
    }

    /// Receive a [`PassReport`] after every pass the loop runs.
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<PassReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    pub fn build(self) -> ForegroundScheduler {
        ForegroundScheduler {
            core: Arc::new(SchedulerCore {
                store: self.store,
                last_fired: self.last_fired,
                selector: self.selector,
                clock: self.clock,
                content: self.content,
                styles: self.styles,
                hydration: self.hydration,
                background: self.background,
                tick: self.tick,
                handoff_every_ticks: self.handoff_every_ticks,
                handoff_horizon: self.handoff_horizon,
                reports: self.reports,
                passes: tokio::sync::Mutex::new(0),
                live_loops: AtomicUsize::new(0),
            }),
            running: Mutex::new(None),
        }
    }
}

/// Periodic evaluator that runs while the application is in the foreground.
pub struct ForegroundScheduler {
    core: Arc<SchedulerCore>,
    running: Mutex<Option<RunningLoop>>,
}

impl ForegroundScheduler {
    pub fn builder(
        store: Arc<dyn ReminderStore>,
        last_fired: Arc<dyn LastFiredStore>,
        selector: Arc<DeliveryChannelSelector>,
    ) -> SchedulerBuilder {
        SchedulerBuilder {
            store,
            last_fired,
            selector,
            clock: Arc::new(SystemClock),
            content: Arc::new(PhraseBook::default()),
            styles: StylePicker::new(Default::default(), Default::default()),
            hydration: None,
            background: None,
            tick: Duration::from_secs(TICK_INTERVAL_SECS),
            handoff_every_ticks: 1,
            handoff_horizon: ChronoDuration::hours(crate::background::DEFAULT_HORIZON_HOURS),
            reports: None,
        }
    }

    /// Start the loop. The first pass runs immediately.
    ///
    /// Returns `false` without doing anything when already running.
    pub fn start(&self) -> bool {
        let mut running = self.lock_running();
        if running
            .as_ref()
            .is_some_and(|r| !r.cancel.is_cancelled() && !r.task.is_finished())
        {
            debug!("foreground scheduler already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let core = Arc::clone(&self.core);
        let token = cancel.clone();
        let task = tokio::spawn(async move { core.run_loop(token).await });
        *running = Some(RunningLoop { cancel, task });
        info!(tick_secs = self.core.tick.as_secs(), "foreground scheduler started");
        true
    }

    /// Stop the loop. No pass starts after this returns; a pass already in
    /// flight finishes its current reminder list. The loop task then hands
    /// the full upcoming batch to the background host, if there is one.
    ///
    /// Returns `false` when the loop was not running.
    pub fn stop(&self) -> bool {
        match self.lock_running().take() {
            Some(running) => {
                running.cancel.cancel();
                info!("foreground scheduler stopped");
                true
            }
            None => false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock_running()
            .as_ref()
            .is_some_and(|r| !r.cancel.is_cancelled() && !r.task.is_finished())
    }

    /// Run a single pass now, outside the tick schedule.
    pub async fn run_pass(&self) -> PassReport {
        self.core.run_pass().await
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<RunningLoop>> {
        match self.running.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Drop for ForegroundScheduler {
    fn drop(&mut self) {
        if let Some(running) = self.lock_running().take() {
            running.cancel.cancel();
        }
    }
}

impl SchedulerCore {
    async fn run_loop(&self, cancel: CancellationToken) {
        self.live_loops.fetch_add(1, Ordering::SeqCst);
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!("foreground loop cancelled");
                    break;
                }
                _ = interval.tick() => {
                    let report = self.run_pass().await;
                    if let Some(tx) = &self.reports {
                        let _ = tx.send(report);
                    }
                }
            }
        }
        self.live_loops.fetch_sub(1, Ordering::SeqCst);
        self.closing_handoff().await;
    }

    /// Hand the host every upcoming firing once the loop no longer covers
    /// the near ones.
    async fn closing_handoff(&self) {
        let _passes = self.passes.lock().await;
        let now = self.clock.now();
        let reminders = match self.store.list_reminders().await {
            Ok(reminders) => self.merge_hydration(reminders),
            Err(e) => {
                warn!("closing handoff skipped, failed to list reminders: {e}");
                return;
            }
        };
        let status = self.handoff(&reminders, now);
        debug!(?status, "closing handoff");
    }

    fn merge_hydration(&self, mut reminders: Vec<Reminder>) -> Vec<Reminder> {
        if let Some(hydration) = &self.hydration {
            reminders.retain(|r| r.id != hydration.id);
            reminders.push(hydration.clone());
        }
        reminders
    }

    async fn run_pass(&self) -> PassReport {
        let mut passes = self.passes.lock().await;
        let pass_index = *passes;
        *passes += 1;

        let now = self.clock.now();
        let mut report = PassReport::new(now);

        let reminders = match self.store.list_reminders().await {
            Ok(reminders) => reminders,
            Err(e) => {
                error!("failed to list reminders: {e}");
                report.store_error = Some(e.to_string());
                Vec::new()
            }
        };
        let reminders = self.merge_hydration(reminders);
        report.evaluated = reminders.len();

        for reminder in &reminders {
            self.evaluate_one(reminder, now, &mut report).await;
        }

        if pass_index % u64::from(self.handoff_every_ticks) == 0 {
            report.handoff = if report.store_error.is_some() {
                // A partial list would cancel the host's timers for every
                // stored reminder; keep the previous batch armed instead.
                warn!("handoff withheld, reminder list unavailable");
                HandoffStatus::Withheld
            } else {
                self.handoff(&reminders, now)
            };
        }

        if !report.fired.is_empty() || !report.persist_failures.is_empty() {
            info!(
                fired = report.fired.len(),
                persist_failures = report.persist_failures.len(),
                "foreground pass complete"
            );
        } else {
            debug!(evaluated = report.evaluated, "foreground pass complete");
        }
        report
    }

    async fn evaluate_one(
        &self,
        reminder: &Reminder,
        now: DateTime<FixedOffset>,
        report: &mut PassReport,
    ) {
        let last = match self.last_fired.get(&reminder.id) {
            Ok(last) => last,
            Err(e) => {
                // Without history the reminder would look never-fired.
                error!(reminder_id = %reminder.id, "failed to read last-fired time: {e}");
                report
                    .persist_failures
                    .push((reminder.id.clone(), e.to_string()));
                return;
            }
        };

        match evaluate(reminder, &now, last) {
            FireDecision::Fire => {
                let event =
                    NotificationEvent::for_firing(&reminder.id, self.compose(reminder), now.to_utc());
                let outcome = self.selector.deliver(&event).await;
                debug!(reminder_id = %reminder.id, ?outcome, "reminder fired");
                // Recorded regardless of outcome: a denied permission must
                // not turn into a retry every tick.
                if let Err(e) = self.last_fired.record(&reminder.id, now.to_utc()) {
                    error!(reminder_id = %reminder.id, "failed to record firing: {e}");
                    report
                        .persist_failures
                        .push((reminder.id.clone(), e.to_string()));
                }
                report.fired.push(FiredReminder {
                    reminder_id: reminder.id.clone(),
                    outcome,
                });
            }
            FireDecision::Misconfigured(e) => {
                warn!(reminder_id = %reminder.id, "skipping misconfigured reminder: {e}");
                report.misconfigured.push((reminder.id.clone(), e));
            }
            other => debug!(reminder_id = %reminder.id, decision = ?other, "not firing"),
        }
    }

    fn compose(&self, reminder: &Reminder) -> NotificationContent {
        let style = self.styles.pick(reminder, &mut rand::thread_rng());
        self.content.compose(reminder, style)
    }

    /// How far ahead a live loop will evaluate before the next handoff
    /// replaces the batch being built.
    fn live_coverage(&self) -> ChronoDuration {
        let ticks = self.handoff_every_ticks.saturating_add(1);
        ChronoDuration::from_std(self.tick.saturating_mul(ticks)).unwrap_or_else(|_| ChronoDuration::weeks(1))
    }

    fn handoff(&self, reminders: &[Reminder], now: DateTime<FixedOffset>) -> HandoffStatus {
        let Some(host) = self
            .background
            .clone()
            .filter(BackgroundHostHandle::is_reachable)
            .or_else(|| self.selector.attached_worker())
        else {
            debug!("no background host to hand off to");
            return HandoffStatus::NoHost;
        };

        let last_fired = match self.last_fired.snapshot() {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("handoff skipped, last-fired snapshot failed: {e}");
                return HandoffStatus::Failed(e.to_string());
            }
        };
        let mut batch = build_batch(reminders, &last_fired, now, self.handoff_horizon, |r| {
            self.compose(r)
        });
        if self.live_loops.load(Ordering::SeqCst) > 0 {
            let covered_until = now + self.live_coverage();
            batch.fires.retain(|fire| fire.fire_at > covered_until);
        }
        let fires = batch.len();
        match host.schedule(batch) {
            Ok(()) => {
                debug!(fires, "handed off batch to background host");
                HandoffStatus::Sent { fires }
            }
            Err(e) => {
                warn!("handoff to background host failed: {e}");
                HandoffStatus::Failed(e.to_string())
            }
        }
    }
}
