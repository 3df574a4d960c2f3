//! On-demand host resolution.

use super::{BackgroundHostHandle, BackgroundTimerHost, HostConfig};
use crate::clock::Clock;
use crate::delivery::{DirectNotifier, WorkerResolver};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tracing::info;

/// Resolves to a live in-process host, spawning a new one when the last one
/// has gone away.
pub struct HostSpawner {
    notifier: Arc<dyn DirectNotifier>,
    clock: Arc<dyn Clock>,
    config: HostConfig,
    current: Mutex<Option<BackgroundHostHandle>>,
}

impl HostSpawner {
    pub fn new(notifier: Arc<dyn DirectNotifier>, clock: Arc<dyn Clock>, config: HostConfig) -> Self {
        Self {
            notifier,
            clock,
            config,
            current: Mutex::new(None),
        }
    }
}

#[async_trait]
impl WorkerResolver for HostSpawner {
    async fn resolve(&self) -> Result<BackgroundHostHandle> {
        let mut current = match self.current.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = current.as_ref().filter(|h| h.is_reachable()) {
            return Ok(handle.clone());
        }
        let (handle, _task) = BackgroundTimerHost::spawn(
            Arc::clone(&self.notifier),
            Arc::clone(&self.clock),
            self.config,
        );
        info!("spawned replacement background timer host");
        *current = Some(handle.clone());
        Ok(handle)
    }
}
