use crate::{codec::parse_bool, orchestrator::SyncOrchestrator};
use arc_swap::ArcSwapOption;
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use serde::Serialize;
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

pub const MIN_INTERVAL: Duration = Duration::from_millis(500);
pub const MIN_GLOBAL_INTERVAL: Duration = Duration::from_secs(10);

pub const GENERAL_GROUP: &str = "AllgemeineParameter";
pub const COUNTER_GROUP: &str = "Daten_Langzeittest";
const COUNTER_PREFIX: &str = "ZaehlerVentil_";
const UNIT_PREFIX: &str = "Ventil";
const STATUS_PARAM: &str = "Status";
const READY_PARAM: &str = "DatenReady";
const CORRELATION_PARAM: &str = "MessIDCurrent";

pub const DEFAULT_GENERAL_PARAMETERS: [&str; 6] = [
    "Fehlerbit",
    "CurrentAirPressure",
    "CurrentAirFlow",
    "CurrentForce",
    "MessMode",
    "OperationMode",
];

pub const DEFAULT_GLOBAL_SIGNALS: [(&str, &str); 4] = [
    ("BatteryStatus", "ns=5;i=8018"),
    ("GeneralErrors", "ns=5;i=8019"),
    ("TemperaturePLC", "ns=5;i=8017"),
    ("Version", "ns=5;i=8016"),
];

/// Measurement channels each unit reports on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Channel {
    Current,
    Flow,
    Force,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Current, Channel::Flow, Channel::Force];

    pub fn group_prefix(self) -> &'static str {
        match self {
            Channel::Current => "Daten_Strommessung",
            Channel::Flow => "Daten_Durchflussmessung",
            Channel::Force => "Daten_Kraftmessung",
        }
    }

    /// `Daten_Kraftmessung/Ventil7`
    pub fn group(self, unit: u16) -> String {
        format!("{}/{UNIT_PREFIX}{unit}", self.group_prefix())
    }
}

/// `None` means the signal could not be read on the last refresh.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStatus {
    pub status: Option<i64>,
    pub ready: Option<i64>,
    pub correlation_id: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnitStatus {
    pub unit: u16,
    pub counter: Option<i64>,
    pub current: ChannelStatus,
    pub flow: ChannelStatus,
    pub force: ChannelStatus,
}

impl UnitStatus {
    pub fn channel(&self, channel: Channel) -> &ChannelStatus {
        match channel {
            Channel::Current => &self.current,
            Channel::Flow => &self.flow,
            Channel::Force => &self.force,
        }
    }

    fn channel_mut(&mut self, channel: Channel) -> &mut ChannelStatus {
        match channel {
            Channel::Current => &mut self.current,
            Channel::Flow => &mut self.flow,
            Channel::Force => &mut self.force,
        }
    }
}

/// Device-wide signals, refreshed on the slow cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalData {
    pub signals: BTreeMap<String, Option<f64>>,
    pub updated_at: DateTime<Utc>,
}

impl GlobalData {
    pub fn signal(&self, name: &str) -> Option<f64> {
        self.signals.get(name).copied().flatten()
    }

    pub fn battery_status(&self) -> Option<f64> {
        self.signal("BatteryStatus")
    }

    pub fn general_errors(&self) -> Option<f64> {
        self.signal("GeneralErrors")
    }

    pub fn temperature_plc(&self) -> Option<f64> {
        self.signal("TemperaturePLC")
    }

    pub fn version(&self) -> Option<f64> {
        self.signal("Version")
    }
}

/// One block's key signals as of `last_updated`. Never mutated after publication.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheSnapshot {
    pub block_index: u16,
    pub last_updated: DateTime<Utc>,
    pub global_data: Option<GlobalData>,
    pub general_parameters: BTreeMap<String, Option<f64>>,
    pub unit_statuses: Vec<UnitStatus>,
}

impl CacheSnapshot {
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.last_updated
    }
}

/// Per-block snapshots readable from any task without blocking refreshes.
#[derive(Debug, Default)]
pub struct CacheStore {
    blocks: DashMap<u16, Arc<CacheSnapshot>>,
    global: ArcSwapOption<GlobalData>,
}

impl CacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, block: u16) -> Option<Arc<CacheSnapshot>> {
        self.blocks.get(&block).map(|s| Arc::clone(s.value()))
    }

    pub fn all(&self) -> BTreeMap<u16, Arc<CacheSnapshot>> {
        self.blocks
            .iter()
            .map(|e| (*e.key(), Arc::clone(e.value())))
            .collect()
    }

    pub fn global(&self) -> Option<Arc<GlobalData>> {
        self.global.load_full()
    }

    /// Replace the block's snapshot. `last_updated` never goes backwards.
    pub fn publish(&self, mut snapshot: CacheSnapshot) -> Arc<CacheSnapshot> {
        match self.blocks.entry(snapshot.block_index) {
            Entry::Occupied(mut slot) => {
                let previous = slot.get().last_updated;
                if snapshot.last_updated < previous {
                    snapshot.last_updated = previous;
                }
                let snapshot = Arc::new(snapshot);
                slot.insert(Arc::clone(&snapshot));
                snapshot
            }
            Entry::Vacant(slot) => {
                let snapshot = Arc::new(snapshot);
                slot.insert(Arc::clone(&snapshot));
                snapshot
            }
        }
    }

    pub fn publish_global(&self, data: GlobalData) {
        self.global.store(Some(Arc::new(data)));
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub interval: Duration,
    pub global_interval: Duration,
    pub blocks: Vec<u16>,
    pub units_per_block: u16,
    pub general_parameters: Vec<String>,
    /// Signal name and the address used when the tag map has no global entry for it.
    pub global_signals: Vec<(String, String)>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            global_interval: MIN_GLOBAL_INTERVAL,
            blocks: vec![1, 2, 3, 4],
            units_per_block: 16,
            general_parameters: DEFAULT_GENERAL_PARAMETERS.iter().map(|s| s.to_string()).collect(),
            global_signals: DEFAULT_GLOBAL_SIGNALS
                .iter()
                .map(|(n, a)| (n.to_string(), a.to_string()))
                .collect(),
        }
    }
}

/// Keeps [`CacheStore`] fresh with a fast per-block cycle and a slow global cycle.
pub struct CachePoller {
    orchestrator: Arc<SyncOrchestrator>,
    store: Arc<CacheStore>,
    config: CacheConfig,
    interval_ms: AtomicU64,
}

impl CachePoller {
    pub fn new(orchestrator: Arc<SyncOrchestrator>, store: Arc<CacheStore>, mut config: CacheConfig) -> Self {
        if config.global_interval < MIN_GLOBAL_INTERVAL {
            warn!(
                configured_ms = config.global_interval.as_millis() as u64,
                floor_ms = MIN_GLOBAL_INTERVAL.as_millis() as u64,
                "Global cache interval raised to floor"
            );
            config.global_interval = MIN_GLOBAL_INTERVAL;
        }
        let interval_ms = clamp_interval(config.interval.as_millis() as u64);
        Self {
            orchestrator,
            store,
            config,
            interval_ms: AtomicU64::new(interval_ms),
        }
    }

    #[inline]
    pub fn store(&self) -> &Arc<CacheStore> {
        &self.store
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::Relaxed))
    }

    /// Change the fast-cycle interval; values below the floor are raised to it.
    pub fn set_interval_ms(&self, ms: u64) -> u64 {
        let ms = clamp_interval(ms);
        self.interval_ms.store(ms, Ordering::Relaxed);
        ms
    }

    /// Rebuild and publish one block. Skipped while the link is down so the
    /// previous snapshot stays readable with its original timestamp.
    pub async fn refresh_block(&self, block: u16) -> Option<Arc<CacheSnapshot>> {
        if !self.orchestrator.link().is_connected() {
            trace!(block, "Link down, keeping previous snapshot");
            return None;
        }

        let mut general_parameters = BTreeMap::new();
        for name in &self.config.general_parameters {
            let value = self.read_f64(block, GENERAL_GROUP, name).await;
            general_parameters.insert(name.clone(), value);
        }

        let mut unit_statuses = Vec::with_capacity(self.config.units_per_block as usize);
        for unit in 1..=self.config.units_per_block {
            let mut status = UnitStatus {
                unit,
                ..Default::default()
            };
            for channel in Channel::ALL {
                let group = channel.group(unit);
                let slot = status.channel_mut(channel);
                slot.status = self.read_i64(block, &group, STATUS_PARAM).await;
                slot.ready = self.read_i64(block, &group, READY_PARAM).await;
                slot.correlation_id = self.read_i64(block, &group, CORRELATION_PARAM).await;
            }
            status.counter = self
                .read_i64(block, COUNTER_GROUP, &format!("{COUNTER_PREFIX}{unit}"))
                .await;
            unit_statuses.push(status);
        }

        let snapshot = CacheSnapshot {
            block_index: block,
            last_updated: Utc::now(),
            global_data: self.store.global().map(|g| (*g).clone()),
            general_parameters,
            unit_statuses,
        };
        Some(self.store.publish(snapshot))
    }

    pub async fn refresh_all(&self) {
        for &block in &self.config.blocks {
            self.refresh_block(block).await;
        }
    }

    /// Read the device-wide signals, preferring global tag entries over the
    /// configured fallback addresses.
    pub async fn refresh_global(&self) -> Option<Arc<GlobalData>> {
        if !self.orchestrator.link().is_connected() {
            trace!("Link down, keeping previous global data");
            return None;
        }
        let mut signals = BTreeMap::new();
        for (name, fallback) in &self.config.global_signals {
            let address = self
                .orchestrator
                .tags()
                .global(name)
                .map_or(fallback.as_str(), |e| e.address.as_str());
            let value = match self.orchestrator.read_address(address).await {
                Ok(v) => v.as_f64(),
                Err(e) => {
                    debug!(signal = %name, address, error = %e, "Global signal unavailable");
                    None
                }
            };
            signals.insert(name.clone(), value);
        }
        self.store.publish_global(GlobalData {
            signals,
            updated_at: Utc::now(),
        });
        self.store.global()
    }

    pub async fn run_fast_loop(self: Arc<Self>, cancel: CancellationToken) {
        debug!(interval_ms = self.interval().as_millis() as u64, "Cache fast cycle started");
        loop {
            self.refresh_all().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval()) => {}
            }
        }
        debug!("Cache fast cycle stopped");
    }

    pub async fn run_global_loop(self: Arc<Self>, cancel: CancellationToken) {
        debug!(
            interval_ms = self.config.global_interval.as_millis() as u64,
            "Cache global cycle started"
        );
        loop {
            self.refresh_global().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.global_interval) => {}
            }
        }
        debug!("Cache global cycle stopped");
    }

    async fn read_text(&self, block: u16, group: &str, param: &str) -> Option<String> {
        match self.orchestrator.read_parameter(block, group, param).await {
            Ok(p) => Some(p.value),
            Err(e) => {
                trace!(block, group, param, error = %e, "Cache signal unavailable");
                None
            }
        }
    }

    async fn read_f64(&self, block: u16, group: &str, param: &str) -> Option<f64> {
        self.read_text(block, group, param)
            .await
            .and_then(|v| numeric(&v))
    }

    async fn read_i64(&self, block: u16, group: &str, param: &str) -> Option<i64> {
        self.read_f64(block, group, param)
            .await
            .filter(|f| f.is_finite())
            .map(|f| f.trunc() as i64)
    }
}

fn clamp_interval(ms: u64) -> u64 {
    let floor = MIN_INTERVAL.as_millis() as u64;
    if ms < floor {
        warn!(configured_ms = ms, floor_ms = floor, "Cache interval raised to floor");
        floor
    } else {
        ms
    }
}

/// Numbers and booleans as f64.
pub(crate) fn numeric(text: &str) -> Option<f64> {
    let text = text.trim();
    text.parse::<f64>()
        .ok()
        .or_else(|| parse_bool(text).map(|b| if b { 1.0 } else { 0.0 }))
}
