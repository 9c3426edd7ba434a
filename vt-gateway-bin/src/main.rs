use clap::Parser;
use std::{env::current_dir, path::PathBuf, sync::Arc, time::Duration};
use tracing::{info, warn};
use vt_gateway_common::{apply_runtime_dir, ensure_runtime_directories, listen_for_shutdown, Logger};
use vt_gateway_core::{
    cache::{DEFAULT_GENERAL_PARAMETERS, DEFAULT_GLOBAL_SIGNALS},
    watcher::default_monitored_groups,
    CacheConfig, CachePoller, CacheStore, ChangeWatcher, DeviceLink, LinkConfig, MonitoredGroup,
    SyncOrchestrator, TagMap, VTGateway, WatcherConfig,
};
use vt_gateway_error::{VTError, VTResult};
use vt_gateway_models::{
    constants::DEFAULT_CONFIG_FILE_NAME,
    settings::{DeviceAuth, Settings},
};
use vt_gateway_opcua::{OpcUaAuth, OpcUaClient, OpcUaClientConfig};
use vt_gateway_sdk::{DeviceClient, SnapshotStore};
use vt_gateway_storage::JsonFileSnapshotStore;

const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// VT Gateway - OPC UA bridge for the valve test rig
///
/// Resolves logical block/group/parameter names against the rig's tag mapping,
/// keeps a live status cache of every block, and persists measurement groups
/// whenever the controller signals new data.
#[derive(Parser)]
#[command(name = "vt-gateway")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "VT Gateway", long_about = None)]
struct Cli {
    /// Sets a custom config file with full path
    ///
    /// If not specified, the gateway will look for 'gateway.toml'
    /// in the current working directory.
    #[arg(short, long, env = "VT_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> VTResult<()> {
    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(p) => p,
        None => {
            let dir = current_dir()
                .map_err(|e| VTError::from(format!("Failed to get current directory: {e}")))?;
            dir.join(DEFAULT_CONFIG_FILE_NAME)
        }
    };
    let settings = Settings::new(&config_path.to_string_lossy())?;

    apply_runtime_dir(&settings.general.runtime_dir)?;
    ensure_runtime_directories(&[
        settings.log.dir.as_str(),
        settings.storage.snapshot_dir.as_str(),
        "pki",
    ])?;

    let mut logger = Logger::new(Some(Logger::parse_level(&settings.log.level)))
        .with_file(&settings.log.dir, &settings.log.file_name);
    logger.initialize()?;
    info!(config = %config_path.display(), "Configuration loaded");

    let gateway = build_gateway(&settings)?;
    gateway.start();

    listen_for_shutdown(gateway.shutdown_token()).await?;

    info!("Starting graceful shutdown...");
    if let Err(e) = gateway.stop(SHUTDOWN_TIMEOUT).await {
        warn!(error = %e, "Gateway did not stop cleanly");
    }
    info!("Graceful shutdown completed");
    Ok(())
}

/// Wire the device link, orchestrator and background services from settings.
fn build_gateway(settings: &Settings) -> VTResult<VTGateway> {
    let tags = Arc::new(TagMap::load(&settings.mapping.path));
    if tags.is_empty() {
        warn!(path = %settings.mapping.path, "Tag map is empty, every lookup will report an unmapped block");
    } else {
        info!(
            blocks = tags.blocks().count(),
            entries = tags.entry_count(),
            "Tag map loaded"
        );
    }

    let device = &settings.device;
    let client: Arc<dyn DeviceClient> = Arc::new(OpcUaClient::new(OpcUaClientConfig {
        endpoint: device.endpoint.clone(),
        application_name: device.application_name.clone(),
        application_uri: device.application_uri.clone(),
        session_timeout_ms: device.session_timeout_ms,
        request_timeout_ms: device.request_timeout_ms,
        connect_timeout_ms: device.connect_timeout_ms,
        auth: match &device.auth {
            DeviceAuth::Anonymous => OpcUaAuth::Anonymous,
            DeviceAuth::UserPassword { username, password } => OpcUaAuth::UserPassword {
                username: username.clone(),
                password: password.clone(),
            },
        },
    }));
    let link = Arc::new(DeviceLink::new(
        client,
        LinkConfig {
            reconnect_interval: Duration::from_millis(device.reconnect_interval_ms),
        },
    ));
    let orchestrator = Arc::new(
        SyncOrchestrator::new(Arc::clone(&tags), link)
            .with_selector_token(settings.command.selector_token.clone()),
    );

    let mut gateway = VTGateway::new(Arc::clone(&orchestrator));

    let cache = &settings.cache;
    if cache.enabled {
        let general_parameters = if cache.general_parameters.is_empty() {
            DEFAULT_GENERAL_PARAMETERS.iter().map(|s| s.to_string()).collect()
        } else {
            cache.general_parameters.clone()
        };
        let global_signals = if cache.global_signals.is_empty() {
            DEFAULT_GLOBAL_SIGNALS
                .iter()
                .map(|(n, a)| (n.to_string(), a.to_string()))
                .collect()
        } else {
            cache
                .global_signals
                .iter()
                .map(|s| (s.name.clone(), s.address.clone()))
                .collect()
        };
        let poller = CachePoller::new(
            Arc::clone(&orchestrator),
            Arc::new(CacheStore::new()),
            CacheConfig {
                interval: Duration::from_millis(cache.interval_ms),
                global_interval: Duration::from_millis(cache.global_interval_ms),
                blocks: cache.blocks.clone(),
                units_per_block: cache.units_per_block,
                general_parameters,
                global_signals,
            },
        );
        gateway = gateway.with_cache(Arc::new(poller));
    }

    let watcher = &settings.watcher;
    if watcher.enabled {
        let monitored = if watcher.monitored.is_empty() {
            default_monitored_groups(&cache.blocks, cache.units_per_block)
        } else {
            watcher
                .monitored
                .iter()
                .map(|m| MonitoredGroup::new(m.block, m.group.clone()))
                .collect()
        };
        let store: Arc<dyn SnapshotStore> =
            Arc::new(JsonFileSnapshotStore::new(&settings.storage.snapshot_dir));
        let watcher = ChangeWatcher::new(
            Arc::clone(&orchestrator),
            store,
            WatcherConfig {
                interval: Duration::from_millis(watcher.interval_ms),
                readiness_parameter: watcher.readiness_parameter.clone(),
                monitored,
                concurrency: watcher.concurrency,
            },
        );
        gateway = gateway.with_watcher(Arc::new(watcher));
    }

    Ok(gateway)
}
