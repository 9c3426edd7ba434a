use crate::{
    cache::{CachePoller, CacheStore},
    link::DeviceLink,
    orchestrator::SyncOrchestrator,
    watcher::ChangeWatcher,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::info;
use vt_gateway_error::{VTError, VTResult};

/// Owns the background loops and their shared shutdown token.
pub struct VTGateway {
    link: Arc<DeviceLink>,
    orchestrator: Arc<SyncOrchestrator>,
    cache: Option<Arc<CachePoller>>,
    watcher: Option<Arc<ChangeWatcher>>,
    shutdown_token: CancellationToken,
    tracker: TaskTracker,
    started: AtomicBool,
}

impl VTGateway {
    pub fn new(orchestrator: Arc<SyncOrchestrator>) -> Self {
        Self {
            link: Arc::clone(orchestrator.link()),
            orchestrator,
            cache: None,
            watcher: None,
            shutdown_token: CancellationToken::new(),
            tracker: TaskTracker::new(),
            started: AtomicBool::new(false),
        }
    }

    pub fn with_cache(mut self, poller: Arc<CachePoller>) -> Self {
        self.cache = Some(poller);
        self
    }

    pub fn with_watcher(mut self, watcher: Arc<ChangeWatcher>) -> Self {
        self.watcher = Some(watcher);
        self
    }

    #[inline]
    pub fn orchestrator(&self) -> &Arc<SyncOrchestrator> {
        &self.orchestrator
    }

    #[inline]
    pub fn link(&self) -> &Arc<DeviceLink> {
        &self.link
    }

    pub fn cache_store(&self) -> Option<&Arc<CacheStore>> {
        self.cache.as_ref().map(|c| c.store())
    }

    pub fn watcher(&self) -> Option<&Arc<ChangeWatcher>> {
        self.watcher.as_ref()
    }

    #[inline]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Spawn every loop and return. Idempotent; returns `false` when already started.
    ///
    /// The reconnect loop makes the first connection attempt, so a slow or
    /// unreachable device never delays startup or shutdown handling.
    pub fn start(&self) -> bool {
        if self.started.swap(true, Ordering::AcqRel) {
            return false;
        }

        let cancel = self.shutdown_token.child_token();
        self.tracker
            .spawn(Arc::clone(&self.link).run_reconnect_loop(cancel.clone()));
        if let Some(cache) = &self.cache {
            self.tracker
                .spawn(Arc::clone(cache).run_fast_loop(cancel.clone()));
            self.tracker
                .spawn(Arc::clone(cache).run_global_loop(cancel.clone()));
        }
        if let Some(watcher) = &self.watcher {
            self.tracker.spawn(Arc::clone(watcher).run(cancel.clone()));
        }
        info!(
            cache = self.cache.is_some(),
            watcher = self.watcher.is_some(),
            endpoint = %self.link.endpoint(),
            "Gateway started"
        );
        true
    }

    /// Number of loops spawned by [`start`](Self::start) that are still running.
    #[inline]
    pub fn running_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Cancel every loop and wait for them to finish, at most `timeout`.
    pub async fn stop(&self, timeout: Duration) -> VTResult<()> {
        self.shutdown_token.cancel();
        self.tracker.close();
        match tokio::time::timeout(timeout, self.tracker.wait()).await {
            Ok(()) => {
                info!("Gateway stopped");
                Ok(())
            }
            Err(_) => Err(VTError::ShutdownError(format!(
                "background tasks still running after {timeout:?}"
            ))),
        }
    }
}
