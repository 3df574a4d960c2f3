//! Delivery channel selection.
//!
//! [`DeliveryChannelSelector::deliver`] walks a fixed priority chain and
//! stops at the first channel that accepts the event:
//!
//! 1. an attached, reachable background host (it may hold display rights
//!    the foreground lacks);
//! 2. a background host resolved on demand through a [`WorkerResolver`];
//! 3. the local [`DirectNotifier`], auto-dismissed after a fixed delay;
//! 4. nothing: the event is dropped and a no-op outcome returned.
//!
//! Delivery only happens when permission is [`Permission::Granted`], and
//! `deliver` never returns an error to its caller.

pub mod direct;
pub mod permission;

pub use direct::{
    ChannelNotifier, DirectNotifier, FocusCallback, NoticeUpdate, ShowResult, TracingNotifier,
};
pub use permission::{ConfiguredPermission, Permission, PermissionSource};

use crate::background::BackgroundHostHandle;
use crate::error::Result;
use crate::notification::NotificationEvent;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Finds a background host when none is attached.
#[async_trait]
pub trait WorkerResolver: Send + Sync {
    async fn resolve(&self) -> Result<BackgroundHostHandle>;
}

/// Why nothing was shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    PermissionDenied,
    /// The user has not been asked yet.
    PermissionNotRequested,
    /// The platform has no notification support.
    Unsupported,
    /// Every configured channel was unavailable or failed.
    NoChannel,
}

/// Which channel handled an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Shown by the already-attached background host.
    Worker,
    /// Shown by a background host resolved for this delivery.
    ResolvedWorker,
    /// Shown by the local notifier.
    Direct,
    /// The local notifier recognised a duplicate and did not show it.
    Collapsed,
    Skipped(SkipReason),
}

impl DeliveryOutcome {
    /// Whether the user saw (or already had) the notification.
    pub fn delivered(&self) -> bool {
        !matches!(self, Self::Skipped(_))
    }
}

/// Layered notification transport.
pub struct DeliveryChannelSelector {
    permission: Arc<dyn PermissionSource>,
    worker: Mutex<Option<BackgroundHostHandle>>,
    resolver: Option<Arc<dyn WorkerResolver>>,
    direct: Option<Arc<dyn DirectNotifier>>,
    on_click: Option<FocusCallback>,
    dismiss_after: Duration,
}

impl DeliveryChannelSelector {
    /// A selector with no channels; add them with the `with_*` builders.
    pub fn new(permission: Arc<dyn PermissionSource>) -> Self {
        Self {
            permission,
            worker: Mutex::new(None),
            resolver: None,
            direct: None,
            on_click: None,
            dismiss_after: direct::DEFAULT_AUTO_DISMISS,
        }
    }

    pub fn with_worker(self, handle: BackgroundHostHandle) -> Self {
        self.attach_worker(handle);
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn WorkerResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_direct(mut self, notifier: Arc<dyn DirectNotifier>) -> Self {
        self.direct = Some(notifier);
        self
    }

    /// Callback run when a directly shown notification is clicked.
    pub fn with_focus(mut self, on_click: FocusCallback) -> Self {
        self.on_click = Some(on_click);
        self
    }

    pub fn with_dismiss_after(mut self, dismiss_after: Duration) -> Self {
        self.dismiss_after = dismiss_after;
        self
    }

    pub fn attach_worker(&self, handle: BackgroundHostHandle) {
        *self.lock_worker() = Some(handle);
    }

    pub fn detach_worker(&self) {
        *self.lock_worker() = None;
    }

    /// The attached host, if it is still running.
    pub fn attached_worker(&self) -> Option<BackgroundHostHandle> {
        self.lock_worker()
            .as_ref()
            .filter(|h| h.is_reachable())
            .cloned()
    }

    fn lock_worker(&self) -> std::sync::MutexGuard<'_, Option<BackgroundHostHandle>> {
        match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub async fn permission(&self) -> Permission {
        self.permission.query_permission().await
    }

    /// Ask the user for notification permission.
    ///
    /// Must only be called from an explicit user action. The scheduler
    /// never calls it.
    pub async fn request_permission(&self) -> Permission {
        self.permission.request_permission().await
    }

    /// Deliver `event` through the best available channel.
    pub async fn deliver(&self, event: &NotificationEvent) -> DeliveryOutcome {
        match self.permission.query_permission().await {
            Permission::Granted => {}
            Permission::Denied => return DeliveryOutcome::Skipped(SkipReason::PermissionDenied),
            Permission::Default => {
                return DeliveryOutcome::Skipped(SkipReason::PermissionNotRequested);
            }
            Permission::Unsupported => return DeliveryOutcome::Skipped(SkipReason::Unsupported),
        }

        if let Some(worker) = self.attached_worker() {
            match worker.display(event.clone()).await {
                Ok(()) => return DeliveryOutcome::Worker,
                Err(e) => {
                    warn!(reminder_id = %event.reminder_id, "attached timer host failed to display: {e}");
                    self.detach_worker();
                }
            }
        }

        if let Some(resolver) = &self.resolver {
            match resolver.resolve().await {
                Ok(worker) => match worker.display(event.clone()).await {
                    Ok(()) => {
                        self.attach_worker(worker);
                        return DeliveryOutcome::ResolvedWorker;
                    }
                    Err(e) => {
                        warn!(reminder_id = %event.reminder_id, "resolved timer host failed to display: {e}");
                    }
                },
                Err(e) => debug!("no timer host could be resolved: {e}"),
            }
        }

        if let Some(notifier) = &self.direct {
            match direct::show_transient(notifier, event, self.on_click.clone(), self.dismiss_after)
                .await
            {
                Ok(ShowResult::Shown(_)) => return DeliveryOutcome::Direct,
                Ok(ShowResult::Collapsed) => return DeliveryOutcome::Collapsed,
                Err(e) => {
                    warn!(reminder_id = %event.reminder_id, "direct notification failed: {e}");
                }
            }
        }

        DeliveryOutcome::Skipped(SkipReason::NoChannel)
    }
}
