#![allow(dead_code)]

use async_trait::async_trait;
use std::{
    collections::{HashMap, VecDeque},
    fmt::Write as _,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex, Once,
    },
    time::Duration,
};
use tracing::Level;
use vt_gateway_core::{DeviceLink, LinkConfig, SyncOrchestrator, TagMap};
use vt_gateway_sdk::{
    DeviceClient, DeviceError, DeviceResult, DeviceValue, Parameter, SnapshotStore, StoreError,
    StoreResult,
};

static INIT_TRACING: Once = Once::new();

pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(Level::DEBUG)
            .with_target(false)
            .without_time()
            .try_init();
    });
}

/// Address convention used by [`sample_mapping`].
pub fn addr(block: u16, group: &str, param: &str) -> String {
    format!("ns=3;s=B{block}.{group}.{param}")
}

/// (section, subgroup, [(param, DataTypeId, Count)])
type Section = (&'static str, Option<&'static str>, &'static [(&'static str, i32, i32)]);

const SECTIONS: &[Section] = &[
    (
        "AllgemeineParameter",
        None,
        &[
            ("SkalierungDruckmessungMin", 11, 1),
            ("SkalierungDruckmessungMax", 11, 1),
            ("Fehlerbit", 3, 1),
            ("CurrentAirPressure", 11, 1),
            ("CurrentAirFlow", 11, 1),
            ("CurrentForce", 11, 1),
            ("MessMode", 4, 1),
            ("OperationMode", 4, 1),
        ],
    ),
    (
        "Ventilkonfiguration",
        None,
        &[
            ("VentilAnzahlInVerwendung", 4, 1),
            ("PWMHalten", 4, 1),
            ("KonfigUebernehmen", 1, 1),
        ],
    ),
    (
        "Kommandos",
        None,
        &[
            ("Einzeltest_Start", 1, 1),
            ("Cmd_Langzeittest_Start", 1, 1),
            ("Ventilnummer", 4, 1),
            ("Langzeittest_Start", 1, 1),
            ("Langzeittest_Stop", 1, 1),
            ("Detailtest_Reset", 6, 1),
        ],
    ),
    ("Konfiguration_Detailtest", None, &[("Messdauer", 4, 1)]),
    (
        "Konfiguration_Detailtest",
        Some("Strom"),
        &[("StrommessungAktiv", 1, 1), ("StrommessungMessdauer", 4, 1)],
    ),
    (
        "Daten_Strommessung",
        Some("Ventil1"),
        &[
            ("Status", 4, 1),
            ("DatenReady", 6, 1),
            ("MessIDCurrent", 6, 1),
            ("Strom", 4, 3),
        ],
    ),
    (
        "Daten_Langzeittest",
        None,
        &[("DatenReady", 6, 1), ("ZaehlerVentil_1", 7, 1), ("ZaehlerVentil_2", 7, 1)],
    ),
];

/// A tag document covering blocks 1 and 2, with addresses from [`addr`].
pub fn sample_mapping() -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<DataMapping>\n<Mappings>\n");
    let _ = writeln!(
        xml,
        "<Mapping Label=\"DB_GlobalData1.BatteryStatus\" NodeId=\"ns=5;s=Global.Battery\" DataTypeId=\"11\" />"
    );
    let mut sections: Vec<&str> = SECTIONS.iter().map(|s| s.0).collect();
    sections.dedup();
    for section in sections {
        let _ = writeln!(xml, "<DB_{section}_1-4>");
        for block in [1u16, 2] {
            let _ = writeln!(xml, "<Block{block}>");
            for (_, sub, params) in SECTIONS.iter().filter(|s| s.0 == section) {
                if let Some(sub) = sub {
                    let _ = writeln!(xml, "<{sub}>");
                }
                let group = match sub {
                    Some(sub) => format!("{section}/{sub}"),
                    None => section.to_string(),
                };
                for (param, type_id, count) in params.iter() {
                    let _ = writeln!(
                        xml,
                        "<Mapping Label=\"DB_{section}{block}.{param}\" NodeId=\"{}\" DataTypeId=\"{type_id}\" Count=\"{count}\" />",
                        addr(block, &group, param)
                    );
                }
                if let Some(sub) = sub {
                    let _ = writeln!(xml, "</{sub}>");
                }
            }
            let _ = writeln!(xml, "</Block{block}>");
        }
        let _ = writeln!(xml, "</DB_{section}_1-4>");
    }
    xml.push_str("</Mappings>\n</DataMapping>\n");
    xml
}

type WriteFilter = fn(&DeviceValue) -> bool;

/// In-memory device with scripted reads and per-address write filters.
pub struct MockDevice {
    endpoint: String,
    pub reachable: AtomicBool,
    session: AtomicBool,
    pub connects: AtomicUsize,
    connect_delay: Mutex<Option<Duration>>,
    values: Mutex<HashMap<String, DeviceValue>>,
    scripts: Mutex<HashMap<String, VecDeque<DeviceValue>>>,
    filters: Mutex<HashMap<String, WriteFilter>>,
    read_faults: Mutex<HashMap<String, DeviceError>>,
    writes: Mutex<Vec<(String, DeviceValue)>>,
}

impl MockDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            endpoint: "opc.tcp://mock:4840".to_string(),
            reachable: AtomicBool::new(true),
            session: AtomicBool::new(false),
            connects: AtomicUsize::new(0),
            connect_delay: Mutex::new(None),
            values: Mutex::new(HashMap::new()),
            scripts: Mutex::new(HashMap::new()),
            filters: Mutex::new(HashMap::new()),
            read_faults: Mutex::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
        })
    }

    pub fn set(&self, address: impl Into<String>, value: DeviceValue) {
        self.values.lock().unwrap().insert(address.into(), value);
    }

    pub fn value(&self, address: &str) -> Option<DeviceValue> {
        self.values.lock().unwrap().get(address).cloned()
    }

    /// Successive reads of `address` return `values` in order, then keep the last one.
    pub fn script(&self, address: impl Into<String>, values: Vec<DeviceValue>) {
        self.scripts
            .lock()
            .unwrap()
            .insert(address.into(), values.into_iter().collect());
    }

    /// Writes to `address` are rejected unless `accept` returns true.
    pub fn filter_writes(&self, address: impl Into<String>, accept: WriteFilter) {
        self.filters.lock().unwrap().insert(address.into(), accept);
    }

    pub fn fail_reads(&self, address: impl Into<String>, err: DeviceError) {
        self.read_faults.lock().unwrap().insert(address.into(), err);
    }

    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock().unwrap() = Some(delay);
    }

    /// Simulate the server going away: the session dies and reconnects fail.
    pub fn drop_session(&self) {
        self.session.store(false, Ordering::SeqCst);
        self.reachable.store(false, Ordering::SeqCst);
    }

    pub fn writes(&self) -> Vec<(String, DeviceValue)> {
        self.writes.lock().unwrap().clone()
    }

    pub fn writes_to(&self, address: &str) -> Vec<DeviceValue> {
        self.writes()
            .into_iter()
            .filter(|(a, _)| a == address)
            .map(|(_, v)| v)
            .collect()
    }
}

#[async_trait]
impl DeviceClient for MockDevice {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connect(&self) -> DeviceResult<()> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        let delay = *self.connect_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.reachable.load(Ordering::SeqCst) {
            self.session.store(true, Ordering::SeqCst);
            Ok(())
        } else {
            Err(DeviceError::ConnectFailed("connection refused".into()))
        }
    }

    async fn disconnect(&self) {
        self.session.store(false, Ordering::SeqCst);
    }

    async fn read(&self, address: &str) -> DeviceResult<DeviceValue> {
        if !self.session.load(Ordering::SeqCst) {
            return Err(DeviceError::Transport("connection closed".into()));
        }
        if let Some(err) = self.read_faults.lock().unwrap().get(address) {
            return Err(err.clone());
        }
        let scripted = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(address)
            .and_then(VecDeque::pop_front);
        if let Some(value) = scripted {
            self.set(address, value);
        }
        self.value(address).ok_or_else(|| DeviceError::Rejected {
            address: address.to_string(),
            status: "BadNodeIdUnknown".into(),
        })
    }

    async fn write(&self, address: &str, value: &DeviceValue) -> DeviceResult<()> {
        if !self.session.load(Ordering::SeqCst) {
            return Err(DeviceError::Transport("connection closed".into()));
        }
        self.writes
            .lock()
            .unwrap()
            .push((address.to_string(), value.clone()));
        let accept = self.filters.lock().unwrap().get(address).copied();
        if let Some(accept) = accept {
            if !accept(value) {
                return Err(DeviceError::Rejected {
                    address: address.to_string(),
                    status: "BadTypeMismatch".into(),
                });
            }
        }
        self.set(address, value.clone());
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct SavedSnapshot {
    pub block: u16,
    pub group: String,
    pub counter: i64,
    pub parameters: Vec<Parameter>,
}

#[derive(Default)]
pub struct RecordingStore {
    pub saved: Mutex<Vec<SavedSnapshot>>,
    pub fail: AtomicBool,
    /// Time each save takes before it is recorded.
    pub save_delay: Mutex<Option<Duration>>,
}

impl RecordingStore {
    pub fn saved(&self) -> Vec<SavedSnapshot> {
        self.saved.lock().unwrap().clone()
    }
}

#[async_trait]
impl SnapshotStore for RecordingStore {
    async fn save_group_snapshot(
        &self,
        block: u16,
        group: &str,
        counter: i64,
        parameters: &[Parameter],
    ) -> StoreResult<()> {
        let delay = *self.save_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("disk full".into()));
        }
        self.saved.lock().unwrap().push(SavedSnapshot {
            block,
            group: group.to_string(),
            counter,
            parameters: parameters.to_vec(),
        });
        Ok(())
    }
}

pub struct Harness {
    pub device: Arc<MockDevice>,
    pub link: Arc<DeviceLink>,
    pub orchestrator: Arc<SyncOrchestrator>,
}

/// Mapping from [`sample_mapping`], a mock device, and a link that is not yet connected.
pub fn harness() -> Harness {
    init_tracing();
    let tags = Arc::new(TagMap::from_xml_str(&sample_mapping()).expect("sample mapping parses"));
    let device = MockDevice::new();
    let link = Arc::new(DeviceLink::new(
        device.clone(),
        LinkConfig {
            reconnect_interval: Duration::from_millis(50),
        },
    ));
    let orchestrator = Arc::new(SyncOrchestrator::new(tags, Arc::clone(&link)));
    Harness {
        device,
        link,
        orchestrator,
    }
}

/// Same as [`harness`] with the link connected.
pub async fn connected_harness() -> Harness {
    let h = harness();
    assert!(h.link.try_connect().await);
    h
}
