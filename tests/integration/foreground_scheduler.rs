//! Foreground loop lifecycle, pass behaviour and handoff.

use crate::helpers::{FlakyStore, RecordingNotifier, TokioClock, UnreachableStore, habit, monday_at};
use chrono::Duration as ChronoDuration;
use nudge::background::{BackgroundHostHandle, BackgroundTimerHost, HostConfig};
use nudge::clock::{Clock, ManualClock};
use nudge::delivery::{
    ConfiguredPermission, DeliveryChannelSelector, DeliveryOutcome, DirectNotifier, Permission,
    PermissionSource,
};
use nudge::last_fired::{InMemoryLastFiredIndex, LastFiredStore};
use nudge::notification::dedupe_key_for;
use nudge::reminder::{ActiveWindow, DaySet, Frequency, InMemoryReminderStore, Reminder};
use nudge::scheduler::{ForegroundScheduler, HandoffStatus, SchedulerBuilder};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const TICK: Duration = Duration::from_secs(60);

fn granted_selector(notifier: &Arc<RecordingNotifier>) -> DeliveryChannelSelector {
    DeliveryChannelSelector::new(Arc::new(ConfiguredPermission::new(Permission::Granted)))
        .with_direct(Arc::clone(notifier) as Arc<dyn DirectNotifier>)
}

fn builder(
    reminders: Vec<Reminder>,
    selector: DeliveryChannelSelector,
    clock: &ManualClock,
) -> SchedulerBuilder {
    ForegroundScheduler::builder(
        Arc::new(InMemoryReminderStore::new(reminders)),
        Arc::new(InMemoryLastFiredIndex::default()),
        Arc::new(selector),
    )
    .with_clock(Arc::new(clock.clone()))
    .with_tick(TICK)
}

#[tokio::test(start_paused = true)]
async fn loop_runs_immediately_then_every_tick() {
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = ManualClock::new(monday_at(10, 0));
    let (tx, mut reports) = mpsc::unbounded_channel();
    let scheduler = builder(
        vec![habit("stretch", Frequency::Every30Min)],
        granted_selector(&notifier),
        &clock,
    )
    .with_reports(tx)
    .build();

    assert!(scheduler.start());
    let first = reports.recv().await.unwrap();
    assert_eq!(first.fired_ids(), vec!["stretch"]);

    clock.advance(ChronoDuration::minutes(15));
    let second = reports.recv().await.unwrap();
    assert!(second.fired.is_empty());

    clock.advance(ChronoDuration::minutes(15));
    let third = reports.recv().await.unwrap();
    assert_eq!(third.fired_ids(), vec!["stretch"]);

    assert_eq!(notifier.shown_ids(), vec!["stretch", "stretch"]);
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn no_pass_runs_after_stop() {
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = ManualClock::new(monday_at(10, 0));
    let (tx, mut reports) = mpsc::unbounded_channel();
    let scheduler = builder(
        vec![habit("stretch", Frequency::Every30Min)],
        granted_selector(&notifier),
        &clock,
    )
    .with_reports(tx)
    .build();

    scheduler.start();
    reports.recv().await.unwrap();
    assert!(scheduler.stop());
    assert!(!scheduler.is_running());

    clock.advance(ChronoDuration::hours(2));
    tokio::time::sleep(TICK * 10).await;
    assert!(reports.try_recv().is_err());
    assert_eq!(notifier.shown_ids().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn repeated_start_does_not_double_the_loop() {
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = ManualClock::new(monday_at(10, 0));
    let (tx, mut reports) = mpsc::unbounded_channel();
    let scheduler = builder(vec![], granted_selector(&notifier), &clock)
        .with_reports(tx)
        .build();

    assert!(scheduler.start());
    assert!(!scheduler.start());
    assert!(!scheduler.start());

    reports.recv().await.unwrap();
    tokio::time::sleep(TICK * 3 + TICK / 2).await;
    let mut count = 1;
    while reports.try_recv().is_ok() {
        count += 1;
    }
    // Immediate pass plus three ticks.
    assert_eq!(count, 4);
    scheduler.stop();
}

#[tokio::test]
async fn store_failure_still_evaluates_hydration() {
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = ManualClock::new(monday_at(10, 0));
    let hydration = Reminder::hydration(Frequency::Every1h, ActiveWindow::all_day(), DaySet::all());
    let scheduler = ForegroundScheduler::builder(
        Arc::new(UnreachableStore),
        Arc::new(InMemoryLastFiredIndex::default()),
        Arc::new(granted_selector(&notifier)),
    )
    .with_clock(Arc::new(clock))
    .with_hydration(hydration)
    .build();

    let report = scheduler.run_pass().await;
    assert!(report.store_error.is_some());
    assert_eq!(report.fired_ids(), vec!["hydration"]);
    assert_eq!(notifier.shown_ids(), vec!["hydration"]);
}

#[tokio::test]
async fn regranted_permission_does_not_release_backlog() {
    let notifier = Arc::new(RecordingNotifier::default());
    let permission = Arc::new(ConfiguredPermission::new(Permission::Denied));
    let selector =
        DeliveryChannelSelector::new(Arc::clone(&permission) as Arc<dyn PermissionSource>)
            .with_direct(Arc::clone(&notifier) as Arc<dyn DirectNotifier>);
    let clock = ManualClock::new(monday_at(10, 0));
    let scheduler = builder(
        vec![habit("stretch", Frequency::Every1h)],
        selector,
        &clock,
    )
    .build();

    let denied = scheduler.run_pass().await;
    assert!(!denied.fired[0].outcome.delivered());

    permission.set(Permission::Granted);
    clock.advance(ChronoDuration::minutes(30));
    assert!(scheduler.run_pass().await.fired.is_empty());
    assert!(notifier.shown_ids().is_empty());

    clock.advance(ChronoDuration::minutes(30));
    let report = scheduler.run_pass().await;
    assert_eq!(report.fired[0].outcome, DeliveryOutcome::Direct);
    assert_eq!(notifier.shown_ids(), vec!["stretch"]);
}

#[tokio::test(start_paused = true)]
async fn handoff_primes_background_host() {
    let foreground_notifier = Arc::new(RecordingNotifier::default());
    let host_notifier = Arc::new(RecordingNotifier::default());
    let clock = ManualClock::new(monday_at(10, 0));
    let (host, _task) = BackgroundTimerHost::spawn(
        Arc::clone(&host_notifier) as Arc<dyn DirectNotifier>,
        Arc::new(clock.clone()),
        HostConfig::default(),
    );

    let scheduler = builder(
        vec![habit("stretch", Frequency::Every1h)],
        granted_selector(&foreground_notifier),
        &clock,
    )
    .with_background(host.clone())
    .build();

    let report = scheduler.run_pass().await;
    assert_eq!(report.fired_ids(), vec!["stretch"]);
    // 11:00 through 17:00 today, then 09:00 and 10:00 tomorrow.
    assert_eq!(report.handoff, HandoffStatus::Sent { fires: 9 });
    assert_eq!(host.status().await.unwrap().armed, 9);

    // The foreground stops polling; the host takes over.
    tokio::time::sleep(Duration::from_secs(3600 + 30)).await;
    assert_eq!(host_notifier.shown_ids(), vec!["stretch"]);
    assert_eq!(foreground_notifier.shown_ids(), vec!["stretch"]);
}

#[tokio::test]
async fn handoff_follows_configured_cadence() {
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = ManualClock::new(monday_at(10, 0));
    let (host, _task) = BackgroundTimerHost::spawn(
        Arc::new(RecordingNotifier::default()),
        Arc::new(clock.clone()),
        HostConfig::default(),
    );
    let scheduler = builder(vec![], granted_selector(&notifier), &clock)
        .with_background(host)
        .with_handoff(3, ChronoDuration::hours(24))
        .build();

    let mut statuses = Vec::new();
    for _ in 0..4 {
        statuses.push(scheduler.run_pass().await.handoff);
    }
    assert_eq!(
        statuses,
        vec![
            HandoffStatus::Sent { fires: 0 },
            HandoffStatus::NotDue,
            HandoffStatus::NotDue,
            HandoffStatus::Sent { fires: 0 },
        ]
    );
}

#[tokio::test]
async fn dead_host_degrades_to_foreground_only() {
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = ManualClock::new(monday_at(10, 0));
    let (host, task) = BackgroundTimerHost::spawn(
        Arc::new(RecordingNotifier::default()),
        Arc::new(clock.clone()),
        HostConfig::default(),
    );
    host.shutdown();
    task.await.unwrap();

    let last_fired = Arc::new(InMemoryLastFiredIndex::default());
    let scheduler = ForegroundScheduler::builder(
        Arc::new(InMemoryReminderStore::new(vec![habit(
            "stretch",
            Frequency::Every1h,
        )])),
        Arc::clone(&last_fired) as Arc<dyn LastFiredStore>,
        Arc::new(granted_selector(&notifier)),
    )
    .with_clock(Arc::new(clock))
    .with_background(host)
    .build();

    let report = scheduler.run_pass().await;
    assert_eq!(report.handoff, HandoffStatus::NoHost);
    assert_eq!(notifier.shown_ids(), vec!["stretch"]);
    assert!(last_fired.get("stretch").unwrap().is_some());
}

#[tokio::test]
async fn store_failure_keeps_previous_batch_armed() {
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = ManualClock::new(monday_at(10, 0));
    let (host, _task) = BackgroundTimerHost::spawn(
        Arc::new(RecordingNotifier::default()),
        Arc::new(clock.clone()),
        HostConfig::default(),
    );
    let scheduler = ForegroundScheduler::builder(
        Arc::new(FlakyStore::new(vec![habit("stretch", Frequency::Every1h)])),
        Arc::new(InMemoryLastFiredIndex::default()),
        Arc::new(granted_selector(&notifier)),
    )
    .with_clock(Arc::new(clock.clone()))
    .with_background(host.clone())
    .build();

    let first = scheduler.run_pass().await;
    assert_eq!(first.handoff, HandoffStatus::Sent { fires: 9 });

    clock.advance(ChronoDuration::minutes(1));
    let second = scheduler.run_pass().await;
    assert!(second.store_error.is_some());
    assert_eq!(second.handoff, HandoffStatus::Withheld);

    let status = host.status().await.unwrap();
    assert_eq!(status.batches_received, 1);
    assert_eq!(status.armed, 9);
}

fn wired_like_run(
    clock: Arc<dyn Clock>,
    host_notifier: &Arc<RecordingNotifier>,
) -> (ForegroundScheduler, BackgroundHostHandle) {
    let (host, _task) = BackgroundTimerHost::spawn(
        Arc::clone(host_notifier) as Arc<dyn DirectNotifier>,
        Arc::clone(&clock),
        HostConfig::default(),
    );
    let selector =
        DeliveryChannelSelector::new(Arc::new(ConfiguredPermission::new(Permission::Granted)))
            .with_worker(host.clone());
    let scheduler = ForegroundScheduler::builder(
        Arc::new(InMemoryReminderStore::new(vec![habit(
            "stretch",
            Frequency::Every1h,
        )])),
        Arc::new(InMemoryLastFiredIndex::default()),
        Arc::new(selector),
    )
    .with_clock(clock)
    .with_background(host.clone())
    .with_tick(TICK)
    .build();
    (scheduler, host)
}

#[tokio::test(start_paused = true)]
async fn live_loop_and_host_deliver_each_firing_once() {
    let host_notifier = Arc::new(RecordingNotifier::default());
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::starting_at(monday_at(10, 0)));
    let (scheduler, host) = wired_like_run(clock, &host_notifier);

    scheduler.start();
    tokio::time::sleep(Duration::from_secs(62 * 60 + 30)).await;

    assert_eq!(
        host_notifier.shown_keys(),
        vec![
            dedupe_key_for("stretch", monday_at(10, 0).to_utc()),
            dedupe_key_for("stretch", monday_at(11, 0).to_utc()),
        ]
    );
    assert_eq!(host.status().await.unwrap().suppressed, 0);
    scheduler.stop();
}

#[tokio::test(start_paused = true)]
async fn stopped_loop_hands_near_firing_to_host() {
    let host_notifier = Arc::new(RecordingNotifier::default());
    let clock: Arc<dyn Clock> = Arc::new(TokioClock::starting_at(monday_at(10, 0)));
    let (scheduler, host) = wired_like_run(clock, &host_notifier);

    scheduler.start();
    // Just after the 10:59 pass, whose batch leaves 11:00 to the loop.
    tokio::time::sleep(Duration::from_secs(59 * 60 + 30)).await;
    assert!(scheduler.stop());

    tokio::time::sleep(Duration::from_secs(2 * 60)).await;
    assert_eq!(
        host_notifier.shown_keys(),
        vec![
            dedupe_key_for("stretch", monday_at(10, 0).to_utc()),
            dedupe_key_for("stretch", monday_at(11, 0).to_utc()),
        ]
    );
    assert_eq!(host.status().await.unwrap().fired, 1);
}
