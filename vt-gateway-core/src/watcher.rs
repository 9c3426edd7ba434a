use crate::{cache::Channel, orchestrator::SyncOrchestrator};
use dashmap::{mapref::entry::Entry, DashMap};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use vt_gateway_sdk::SnapshotStore;

pub const MIN_INTERVAL: Duration = Duration::from_millis(100);
pub const DEFAULT_READINESS_PARAMETER: &str = "DatenReady";
const LONG_RUN_GROUP: &str = "Daten_Langzeittest";

/// A (block, group) pair whose readiness counter is watched.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitoredGroup {
    pub block: u16,
    pub group: String,
}

impl MonitoredGroup {
    pub fn new(block: u16, group: impl Into<String>) -> Self {
        Self {
            block,
            group: group.into(),
        }
    }
}

/// Every measurement channel of every unit plus the long-run data group, per block.
pub fn default_monitored_groups(blocks: &[u16], units_per_block: u16) -> Vec<MonitoredGroup> {
    let mut groups = Vec::new();
    for &block in blocks {
        for channel in Channel::ALL {
            for unit in 1..=units_per_block {
                groups.push(MonitoredGroup::new(block, channel.group(unit)));
            }
        }
        groups.push(MonitoredGroup::new(block, LONG_RUN_GROUP));
    }
    groups
}

#[derive(Debug, Clone)]
pub struct WatcherConfig {
    pub interval: Duration,
    pub readiness_parameter: String,
    pub monitored: Vec<MonitoredGroup>,
    /// Groups polled at once within one tick.
    pub concurrency: usize,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            readiness_parameter: DEFAULT_READINESS_PARAMETER.to_string(),
            monitored: default_monitored_groups(&[1, 2, 3, 4], 16),
            concurrency: 8,
        }
    }
}

/// What one poll of one group did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Counter unreadable; nothing changed.
    Skipped,
    /// First observation, baseline seeded.
    Seeded(i64),
    Unchanged(i64),
    /// Counter advanced and a snapshot was handed to the store.
    Persisted(i64),
    /// Counter advanced but the group read or the save failed.
    Lost(i64),
    /// Counter went backwards; baseline moved down without a snapshot.
    Rebased(i64),
}

/// Persists a group snapshot exactly once per readiness-counter increment.
pub struct ChangeWatcher {
    orchestrator: Arc<SyncOrchestrator>,
    store: Arc<dyn SnapshotStore>,
    config: WatcherConfig,
    baseline: DashMap<(u16, String), i64>,
}

impl ChangeWatcher {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, store: Arc<dyn SnapshotStore>, mut config: WatcherConfig) -> Self {
        if config.interval < MIN_INTERVAL {
            warn!(
                configured_ms = config.interval.as_millis() as u64,
                floor_ms = MIN_INTERVAL.as_millis() as u64,
                "Watcher interval raised to floor"
            );
            config.interval = MIN_INTERVAL;
        }
        config.concurrency = config.concurrency.max(1);
        Self {
            orchestrator,
            store,
            config,
            baseline: DashMap::new(),
        }
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub fn monitored(&self) -> &[MonitoredGroup] {
        &self.config.monitored
    }

    pub fn baseline(&self, block: u16, group: &str) -> Option<i64> {
        self.baseline.get(&(block, group.to_string())).map(|v| *v)
    }

    /// Poll every monitored group once.
    pub async fn poll_once(&self) {
        self.poll_until(&CancellationToken::new()).await;
    }

    /// Poll monitored groups until all are done or `cancel` fires. A group
    /// already being polled always runs to completion, so an advanced baseline
    /// is never left without its save.
    async fn poll_until(&self, cancel: &CancellationToken) {
        futures::stream::iter(self.config.monitored.iter())
            .take_until(cancel.cancelled())
            .for_each_concurrent(self.config.concurrency, |target| async move {
                self.poll_group(target.block, &target.group).await;
            })
            .await;
    }

    /// Poll one group's readiness counter and act on the change.
    pub async fn poll_group(&self, block: u16, group: &str) -> PollOutcome {
        let counter = match self
            .orchestrator
            .read_parameter(block, group, &self.config.readiness_parameter)
            .await
        {
            Ok(p) => match parse_counter(&p.value) {
                Some(c) => c,
                None => {
                    debug!(block, group, value = %p.value, "Readiness counter not numeric");
                    return PollOutcome::Skipped;
                }
            },
            Err(e) => {
                trace!(block, group, error = %e, "Readiness counter unreadable");
                return PollOutcome::Skipped;
            }
        };

        let previous = match self.baseline.entry((block, group.to_string())) {
            Entry::Vacant(slot) => {
                slot.insert(counter);
                debug!(block, group, counter, "Readiness baseline seeded");
                return PollOutcome::Seeded(counter);
            }
            Entry::Occupied(mut slot) => {
                let previous = *slot.get();
                if counter != previous {
                    slot.insert(counter);
                }
                previous
            }
        };

        if counter == previous {
            return PollOutcome::Unchanged(counter);
        }
        if counter < previous {
            info!(block, group, previous, counter, "Readiness counter went backwards, rebased");
            return PollOutcome::Rebased(counter);
        }

        let parameters = match self.orchestrator.read_group(block, group).await {
            Ok(parameters) => parameters,
            Err(e) => {
                warn!(block, group, counter, error = %e, "Group read failed, snapshot lost");
                return PollOutcome::Lost(counter);
            }
        };
        match self
            .store
            .save_group_snapshot(block, group, counter, &parameters)
            .await
        {
            Ok(()) => {
                info!(block, group, previous, counter, parameters = parameters.len(), "Group snapshot persisted");
                PollOutcome::Persisted(counter)
            }
            Err(e) => {
                error!(block, group, counter, error = %e, "Failed to persist group snapshot");
                PollOutcome::Lost(counter)
            }
        }
    }

    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        info!(
            groups = self.config.monitored.len(),
            interval_ms = self.config.interval.as_millis() as u64,
            parameter = %self.config.readiness_parameter,
            "Change watcher started"
        );
        loop {
            self.poll_until(&cancel).await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }
        info!("Change watcher stopped");
    }
}

/// Integer text, or the integral part of decimal text.
fn parse_counter(text: &str) -> Option<i64> {
    let text = text.trim();
    text.parse::<i64>().ok().or_else(|| {
        text.parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
    })
}
