//! Delivery channel selector against real notifiers and hosts.

use crate::helpers::RecordingNotifier;
use nudge::background::{HostConfig, HostSpawner};
use nudge::clock::SystemClock;
use nudge::delivery::{
    ChannelNotifier, ConfiguredPermission, DeliveryChannelSelector, DeliveryOutcome,
    DirectNotifier, FocusCallback, NoticeUpdate, Permission, SkipReason,
};
use nudge::notification::NotificationEvent;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

fn granted() -> Arc<ConfiguredPermission> {
    Arc::new(ConfiguredPermission::new(Permission::Granted))
}

#[tokio::test(start_paused = true)]
async fn direct_notice_is_clickable_then_dismissed() {
    let (tx, mut updates) = mpsc::unbounded_channel();
    let notifier = Arc::new(ChannelNotifier::new(tx));
    let focused = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&focused);
    let on_click: FocusCallback = Arc::new(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let selector = DeliveryChannelSelector::new(granted())
        .with_direct(Arc::clone(&notifier) as Arc<dyn DirectNotifier>)
        .with_focus(on_click)
        .with_dismiss_after(Duration::from_secs(5));

    let outcome = selector
        .deliver(&NotificationEvent::manual("Test", "click me"))
        .await;
    assert_eq!(outcome, DeliveryOutcome::Direct);

    let Some(NoticeUpdate::Shown { id, .. }) = updates.recv().await else {
        panic!("expected a shown notice");
    };
    assert!(notifier.click(id));
    assert_eq!(focused.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(updates.recv().await, Some(NoticeUpdate::Dismissed { id }));
    assert_eq!(notifier.visible_count(), 0);
}

#[tokio::test]
async fn resolver_spawns_host_when_none_attached() {
    let host_notifier = Arc::new(RecordingNotifier::default());
    let direct_notifier = Arc::new(RecordingNotifier::default());
    let spawner = HostSpawner::new(
        Arc::clone(&host_notifier) as Arc<dyn DirectNotifier>,
        Arc::new(SystemClock),
        HostConfig::default(),
    );
    let selector = DeliveryChannelSelector::new(granted())
        .with_resolver(Arc::new(spawner))
        .with_direct(Arc::clone(&direct_notifier) as Arc<dyn DirectNotifier>);

    let event = NotificationEvent::manual("Test", "via worker");
    assert_eq!(
        selector.deliver(&event).await,
        DeliveryOutcome::ResolvedWorker
    );
    assert_eq!(selector.deliver(&event).await, DeliveryOutcome::Worker);
    assert_eq!(host_notifier.shown_ids().len(), 2);
    assert!(direct_notifier.shown_ids().is_empty());

    selector.detach_worker();
    assert!(selector.attached_worker().is_none());
}

#[tokio::test]
async fn unsupported_platform_never_reaches_a_channel() {
    let notifier = Arc::new(RecordingNotifier::default());
    let selector =
        DeliveryChannelSelector::new(Arc::new(ConfiguredPermission::new(Permission::Unsupported)))
            .with_direct(Arc::clone(&notifier) as Arc<dyn DirectNotifier>);

    assert_eq!(
        selector
            .deliver(&NotificationEvent::manual("Test", "nope"))
            .await,
        DeliveryOutcome::Skipped(SkipReason::Unsupported)
    );
    assert_eq!(selector.request_permission().await, Permission::Unsupported);
    assert!(notifier.shown_ids().is_empty());
}
