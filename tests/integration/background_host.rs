//! Background timer host: batch replacement, horizon, teardown.

use crate::helpers::{RecordingNotifier, monday_at};
use chrono::{DateTime, Duration as ChronoDuration, FixedOffset};
use nudge::background::{BackgroundTimerHost, HostConfig};
use nudge::clock::ManualClock;
use nudge::content::NotificationContent;
use nudge::delivery::{ChannelNotifier, DirectNotifier, NoticeUpdate};
use nudge::notification::{NotificationEvent, PendingFire, PendingFireBatch};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn pending(id: &str, at: DateTime<FixedOffset>) -> PendingFire {
    let content = NotificationContent {
        title: id.to_owned(),
        body: "due".to_owned(),
    };
    PendingFire {
        reminder_id: id.to_owned(),
        fire_at: at,
        event: NotificationEvent::for_firing(id, content, at.to_utc()),
    }
}

#[tokio::test(start_paused = true)]
async fn replaced_batch_never_fires() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (host, _task) = BackgroundTimerHost::spawn(
        Arc::clone(&notifier) as Arc<dyn DirectNotifier>,
        Arc::new(ManualClock::new(monday_at(9, 0))),
        HostConfig::default(),
    );

    let a = PendingFireBatch::new(
        monday_at(9, 0),
        vec![pending("a", monday_at(9, 0) + ChronoDuration::hours(23))],
    );
    host.schedule(a).unwrap();
    host.schedule(PendingFireBatch::new(monday_at(9, 0), vec![]))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(48 * 3600)).await;
    assert!(notifier.shown_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn entry_beyond_day_is_never_armed() {
    let notifier = Arc::new(RecordingNotifier::default());
    let (host, _task) = BackgroundTimerHost::spawn(
        Arc::clone(&notifier) as Arc<dyn DirectNotifier>,
        Arc::new(ManualClock::new(monday_at(9, 0))),
        HostConfig::default(),
    );
    let batch = PendingFireBatch::new(
        monday_at(9, 0),
        vec![
            pending("soon", monday_at(9, 30)),
            pending("late", monday_at(9, 0) + ChronoDuration::hours(25)),
        ],
    );
    host.schedule(batch).unwrap();
    assert_eq!(host.status().await.unwrap().armed, 1);

    tokio::time::sleep(Duration::from_secs(30 * 3600)).await;
    assert_eq!(notifier.shown_ids(), vec!["soon"]);
}

#[tokio::test(start_paused = true)]
async fn respawned_host_starts_empty() {
    let notifier = Arc::new(RecordingNotifier::default());
    let clock = Arc::new(ManualClock::new(monday_at(9, 0)));
    let (host, task) = BackgroundTimerHost::spawn(
        Arc::clone(&notifier) as Arc<dyn DirectNotifier>,
        clock.clone(),
        HostConfig::default(),
    );
    host.schedule(PendingFireBatch::new(
        monday_at(9, 0),
        vec![pending("a", monday_at(10, 0))],
    ))
    .unwrap();
    drop(host);
    task.await.unwrap();

    let (fresh, _task) = BackgroundTimerHost::spawn(
        Arc::clone(&notifier) as Arc<dyn DirectNotifier>,
        clock,
        HostConfig::default(),
    );
    assert_eq!(fresh.status().await.unwrap().armed, 0);

    tokio::time::sleep(Duration::from_secs(2 * 3600)).await;
    assert!(notifier.shown_ids().is_empty());
}

#[tokio::test(start_paused = true)]
async fn duplicate_firing_collapses_on_dedupe_channel() {
    let (tx, mut updates) = mpsc::unbounded_channel();
    let notifier: Arc<dyn DirectNotifier> = Arc::new(ChannelNotifier::new(tx));
    let (host, _task) = BackgroundTimerHost::spawn(
        Arc::clone(&notifier),
        Arc::new(ManualClock::new(monday_at(9, 0))),
        HostConfig::default(),
    );

    // The foreground already showed the 09:30 firing before the stale
    // batch entry elapsed.
    let fire = pending("water", monday_at(9, 30));
    notifier.show(&fire.event, None).await.unwrap();
    host.schedule(PendingFireBatch::new(monday_at(9, 0), vec![fire]))
        .unwrap();

    tokio::time::sleep(Duration::from_secs(3600)).await;
    let mut shown = 0;
    while let Ok(update) = updates.try_recv() {
        if matches!(update, NoticeUpdate::Shown { .. }) {
            shown += 1;
        }
    }
    assert_eq!(shown, 1);
    assert_eq!(host.status().await.unwrap().fired, 1);
}
