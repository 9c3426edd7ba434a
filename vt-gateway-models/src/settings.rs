use config::{Config, Environment, File};
use serde::{self, Deserialize};
use std::{ops::Deref, sync::Arc};
use vt_gateway_error::VTResult;

use crate::constants::{DEFAULT_MAPPING_PATH, ENV_PREFIX};

#[derive(Debug, Clone)]
pub struct Settings(Arc<Inner>);

impl Deref for Settings {
    type Target = Inner;
    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl Settings {
    /// Load settings from `config_path` layered with `VT__*` environment variables.
    ///
    /// A missing file is not an error; every field has a default.
    pub fn new(config_path: &str) -> VTResult<Self> {
        let builder = Config::builder()
            .add_source(File::with_name(config_path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("cache.blocks")
                    .with_list_parse_key("cache.general_parameters"),
            );
        let inner: Inner = builder.build()?.try_deserialize()?;
        Ok(Self(Arc::new(inner)))
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self(Arc::new(Inner::default()))
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Inner {
    #[serde(default)]
    pub general: General,
    #[serde(default)]
    pub log: Log,
    #[serde(default)]
    pub device: Device,
    #[serde(default)]
    pub mapping: Mapping,
    #[serde(default)]
    pub command: Command,
    #[serde(default)]
    pub cache: Cache,
    #[serde(default)]
    pub watcher: Watcher,
    #[serde(default)]
    pub storage: Storage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    /// Runtime root directory for all relative paths.
    ///
    /// The process changes its working directory here at startup, so the
    /// mapping path, snapshot dir, log dir and `./pki` resolve against it.
    ///
    /// # Environment override
    /// - `VT__GENERAL__RUNTIME_DIR=/var/lib/vt-gateway`
    #[serde(default = "General::runtime_dir_default")]
    pub runtime_dir: String,
}

impl Default for General {
    fn default() -> Self {
        General {
            runtime_dir: General::runtime_dir_default(),
        }
    }
}

impl General {
    fn runtime_dir_default() -> String {
        ".".into()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Log {
    /// One of `trace`, `debug`, `info`, `warn`, `error`.
    #[serde(default = "Log::level_default")]
    pub level: String,
    #[serde(default = "Log::dir_default")]
    pub dir: String,
    #[serde(default = "Log::file_name_default")]
    pub file_name: String,
}

impl Default for Log {
    fn default() -> Self {
        Log {
            level: Log::level_default(),
            dir: Log::dir_default(),
            file_name: Log::file_name_default(),
        }
    }
}

impl Log {
    fn level_default() -> String {
        "info".into()
    }

    fn dir_default() -> String {
        "logs".into()
    }

    fn file_name_default() -> String {
        "vt-gateway.log".into()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Device {
    #[serde(default = "Device::endpoint_default")]
    pub endpoint: String,
    #[serde(default = "Device::application_name_default")]
    pub application_name: String,
    #[serde(default = "Device::application_uri_default")]
    pub application_uri: String,
    #[serde(default = "Device::session_timeout_ms_default")]
    pub session_timeout_ms: u32,
    /// Bound for a single read or write round-trip.
    #[serde(default = "Device::request_timeout_ms_default")]
    pub request_timeout_ms: u64,
    /// Bound for endpoint discovery plus session activation.
    #[serde(default = "Device::connect_timeout_ms_default")]
    pub connect_timeout_ms: u64,
    /// Fixed delay between reconnect attempts.
    #[serde(default = "Device::reconnect_interval_ms_default")]
    pub reconnect_interval_ms: u64,
    #[serde(default)]
    pub auth: DeviceAuth,
}

impl Default for Device {
    fn default() -> Self {
        Device {
            endpoint: Device::endpoint_default(),
            application_name: Device::application_name_default(),
            application_uri: Device::application_uri_default(),
            session_timeout_ms: Device::session_timeout_ms_default(),
            request_timeout_ms: Device::request_timeout_ms_default(),
            connect_timeout_ms: Device::connect_timeout_ms_default(),
            reconnect_interval_ms: Device::reconnect_interval_ms_default(),
            auth: DeviceAuth::default(),
        }
    }
}

impl Device {
    fn endpoint_default() -> String {
        "opc.tcp://localhost:4840".into()
    }

    fn application_name_default() -> String {
        "vt-gateway".into()
    }

    fn application_uri_default() -> String {
        "urn:vt-gateway".into()
    }

    fn session_timeout_ms_default() -> u32 {
        60000
    }

    fn request_timeout_ms_default() -> u64 {
        5000
    }

    fn connect_timeout_ms_default() -> u64 {
        10000
    }

    fn reconnect_interval_ms_default() -> u64 {
        5000
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceAuth {
    #[default]
    Anonymous,
    UserPassword { username: String, password: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Mapping {
    #[serde(default = "Mapping::path_default")]
    pub path: String,
}

impl Default for Mapping {
    fn default() -> Self {
        Mapping {
            path: Mapping::path_default(),
        }
    }
}

impl Mapping {
    fn path_default() -> String {
        DEFAULT_MAPPING_PATH.into()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Command {
    /// Parameter-name token identifying the unit-number selector of a block.
    #[serde(default = "Command::selector_token_default")]
    pub selector_token: String,
}

impl Default for Command {
    fn default() -> Self {
        Command {
            selector_token: Command::selector_token_default(),
        }
    }
}

impl Command {
    fn selector_token_default() -> String {
        "Ventilnummer".into()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Cache {
    #[serde(default = "Cache::enabled_default")]
    pub enabled: bool,
    /// Fast per-block cycle, floored at 500 ms.
    #[serde(default = "Cache::interval_ms_default")]
    pub interval_ms: u64,
    /// Slow global cycle, floored at 10 s.
    #[serde(default = "Cache::global_interval_ms_default")]
    pub global_interval_ms: u64,
    #[serde(default = "Cache::blocks_default")]
    pub blocks: Vec<u16>,
    #[serde(default = "Cache::units_per_block_default")]
    pub units_per_block: u16,
    /// General parameters copied into each block snapshot. Empty keeps the built-in list.
    #[serde(default)]
    pub general_parameters: Vec<String>,
    /// Global signals with their fallback addresses. Empty keeps the built-in signals.
    #[serde(default)]
    pub global_signals: Vec<GlobalSignalEntry>,
}

/// Kept as a list so signal names survive config key normalization.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GlobalSignalEntry {
    pub name: String,
    pub address: String,
}

impl Default for Cache {
    fn default() -> Self {
        Cache {
            enabled: Cache::enabled_default(),
            interval_ms: Cache::interval_ms_default(),
            global_interval_ms: Cache::global_interval_ms_default(),
            blocks: Cache::blocks_default(),
            units_per_block: Cache::units_per_block_default(),
            general_parameters: Vec::new(),
            global_signals: Vec::new(),
        }
    }
}

impl Cache {
    fn enabled_default() -> bool {
        true
    }

    fn interval_ms_default() -> u64 {
        2000
    }

    fn global_interval_ms_default() -> u64 {
        10000
    }

    fn blocks_default() -> Vec<u16> {
        vec![1, 2, 3, 4]
    }

    fn units_per_block_default() -> u16 {
        16
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Watcher {
    #[serde(default = "Watcher::enabled_default")]
    pub enabled: bool,
    /// Floored at 100 ms.
    #[serde(default = "Watcher::interval_ms_default")]
    pub interval_ms: u64,
    #[serde(default = "Watcher::readiness_parameter_default")]
    pub readiness_parameter: String,
    #[serde(default = "Watcher::concurrency_default")]
    pub concurrency: usize,
    /// Groups checked for readiness changes. Empty derives the standard set
    /// from `cache.blocks` and `cache.units_per_block`.
    #[serde(default)]
    pub monitored: Vec<MonitoredGroupEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MonitoredGroupEntry {
    pub block: u16,
    pub group: String,
}

impl Default for Watcher {
    fn default() -> Self {
        Watcher {
            enabled: Watcher::enabled_default(),
            interval_ms: Watcher::interval_ms_default(),
            readiness_parameter: Watcher::readiness_parameter_default(),
            concurrency: Watcher::concurrency_default(),
            monitored: Vec::new(),
        }
    }
}

impl Watcher {
    fn enabled_default() -> bool {
        true
    }

    fn interval_ms_default() -> u64 {
        1000
    }

    fn readiness_parameter_default() -> String {
        "DatenReady".into()
    }

    fn concurrency_default() -> usize {
        8
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
    #[serde(default = "Storage::snapshot_dir_default")]
    pub snapshot_dir: String,
}

impl Default for Storage {
    fn default() -> Self {
        Storage {
            snapshot_dir: Storage::snapshot_dir_default(),
        }
    }
}

impl Storage {
    fn snapshot_dir_default() -> String {
        "./data/snapshots".into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("absent.toml");
        let settings = Settings::new(path.to_str().unwrap()).unwrap();

        assert_eq!(settings.device.reconnect_interval_ms, 5000);
        assert_eq!(settings.device.auth, DeviceAuth::Anonymous);
        assert_eq!(settings.mapping.path, DEFAULT_MAPPING_PATH);
        assert_eq!(settings.cache.blocks, vec![1, 2, 3, 4]);
        assert_eq!(settings.watcher.readiness_parameter, "DatenReady");
        assert!(settings.watcher.monitored.is_empty());
    }

    #[test]
    fn file_values_override_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("gateway.toml");
        std::fs::write(
            &path,
            r#"
[device]
endpoint = "opc.tcp://10.0.0.5:4840"
auth = { kind = "user_password", username = "op", password = "pw" }

[cache]
interval_ms = 750
blocks = [1, 3]

global_signals = [{ name = "BatteryStatus", address = "ns=5;i=8018" }]

[watcher]
monitored = [{ block = 3, group = "Daten_Langzeittest" }]
"#,
        )
        .unwrap();

        let settings = Settings::new(path.to_str().unwrap()).unwrap();
        assert_eq!(settings.device.endpoint, "opc.tcp://10.0.0.5:4840");
        assert_eq!(
            settings.device.auth,
            DeviceAuth::UserPassword {
                username: "op".into(),
                password: "pw".into()
            }
        );
        assert_eq!(settings.cache.interval_ms, 750);
        assert_eq!(settings.cache.blocks, vec![1, 3]);
        assert_eq!(
            settings.cache.global_signals,
            vec![GlobalSignalEntry {
                name: "BatteryStatus".into(),
                address: "ns=5;i=8018".into()
            }]
        );
        assert_eq!(
            settings.watcher.monitored,
            vec![MonitoredGroupEntry {
                block: 3,
                group: "Daten_Langzeittest".into()
            }]
        );
        assert_eq!(settings.storage.snapshot_dir, "./data/snapshots");
    }

    #[test]
    fn environment_overrides_file() {
        std::env::set_var("VT__COMMAND__SELECTOR_TOKEN", "Pruefling");
        let tmp = tempfile::tempdir().unwrap();
        let settings = Settings::new(tmp.path().join("none").to_str().unwrap()).unwrap();
        std::env::remove_var("VT__COMMAND__SELECTOR_TOKEN");

        assert_eq!(settings.command.selector_token, "Pruefling");
    }
}
