use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vt_gateway_error::{SyncError, SyncResult};
use vt_gateway_sdk::{DeviceClient, DeviceError, DeviceValue};

const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

/// Point-in-time view of the link for status endpoints.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceLinkState {
    pub connected: bool,
    pub endpoint: String,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct LinkConfig {
    pub reconnect_interval: Duration,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            reconnect_interval: Duration::from_secs(5),
        }
    }
}

/// The one connection to the device.
///
/// Reads and writes never reconnect on their own. A failure that says the
/// connection is gone marks the link down and the reconnect loop takes over.
pub struct DeviceLink {
    client: Arc<dyn DeviceClient>,
    config: LinkConfig,
    connected: AtomicBool,
    connecting: AtomicBool,
    failed_attempts: AtomicU32,
    last_success_at: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
    state_tx: watch::Sender<LinkState>,
}

/// Clears the in-flight flag when a connect attempt ends, however it ends.
struct ConnectingGuard<'a>(&'a AtomicBool);

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl DeviceLink {
    pub fn new(client: Arc<dyn DeviceClient>, config: LinkConfig) -> Self {
        let (state_tx, _) = watch::channel(LinkState::Disconnected);
        Self {
            client,
            config,
            connected: AtomicBool::new(false),
            connecting: AtomicBool::new(false),
            failed_attempts: AtomicU32::new(0),
            last_success_at: Mutex::new(None),
            last_error: Mutex::new(None),
            state_tx,
        }
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    #[inline]
    pub fn endpoint(&self) -> &str {
        self.client.endpoint()
    }

    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.last_success_at.lock().ok().and_then(|g| *g)
    }

    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|g| g.clone())
    }

    pub fn status(&self) -> DeviceLinkState {
        DeviceLinkState {
            connected: self.is_connected(),
            endpoint: self.endpoint().to_string(),
            last_success_at: self.last_success_at(),
            last_error: self.last_error(),
        }
    }

    pub fn subscribe_state(&self) -> watch::Receiver<LinkState> {
        self.state_tx.subscribe()
    }

    /// Connect unless already connected.
    ///
    /// Safe to call from many tasks: while one attempt is in flight, others
    /// return `false` immediately instead of opening a second session.
    pub async fn try_connect(&self) -> bool {
        if self.is_connected() {
            return true;
        }
        if self
            .connecting
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        let _guard = ConnectingGuard(&self.connecting);
        self.state_tx.send_replace(LinkState::Connecting);

        match self.client.connect().await {
            Ok(()) => {
                self.connected.store(true, Ordering::Release);
                self.failed_attempts.store(0, Ordering::Relaxed);
                self.touch();
                self.set_last_error(None);
                self.state_tx.send_replace(LinkState::Connected);
                info!(endpoint = %self.endpoint(), "Device link connected");
                true
            }
            Err(e) => {
                self.connected.store(false, Ordering::Release);
                self.set_last_error(Some(e.to_string()));
                self.state_tx.send_replace(LinkState::Disconnected);
                let attempt = self.failed_attempts.fetch_add(1, Ordering::Relaxed) + 1;
                if attempt == 1 {
                    warn!(endpoint = %self.endpoint(), error = %e, "Device connect failed");
                } else {
                    debug!(endpoint = %self.endpoint(), attempt, error = %e, "Device connect retry failed");
                }
                false
            }
        }
    }

    pub async fn read_raw(&self, address: &str) -> SyncResult<DeviceValue> {
        if !self.is_connected() {
            return Err(SyncError::DeviceUnavailable);
        }
        match self.client.read(address).await {
            Ok(value) => {
                self.touch();
                Ok(value)
            }
            Err(e) => Err(self.on_device_error(address, e, SyncError::ReadFailed)),
        }
    }

    pub async fn write_raw(&self, address: &str, value: &DeviceValue) -> SyncResult<()> {
        if !self.is_connected() {
            return Err(SyncError::DeviceUnavailable);
        }
        match self.client.write(address, value).await {
            Ok(()) => {
                self.touch();
                Ok(())
            }
            Err(e) => Err(self.on_device_error(address, e, SyncError::WriteFailed)),
        }
    }

    /// Mark the link down after an I/O failure seen elsewhere.
    pub fn mark_disconnected(&self, reason: impl Into<String>) {
        let reason = reason.into();
        if self.connected.swap(false, Ordering::AcqRel) {
            warn!(endpoint = %self.endpoint(), reason = %reason, "Device link lost");
            self.state_tx.send_replace(LinkState::Disconnected);
        }
        self.set_last_error(Some(reason));
    }

    /// Connect right away, then retry every `reconnect_interval` while down,
    /// until cancelled.
    ///
    /// Cancellation abandons an attempt in flight; the client is then
    /// disconnected on the way out, so no half-open session survives.
    pub async fn run_reconnect_loop(self: Arc<Self>, cancel: CancellationToken) {
        debug!(
            interval_ms = self.config.reconnect_interval.as_millis() as u64,
            "Reconnect loop started"
        );
        loop {
            if !self.is_connected() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = self.try_connect() => {}
                }
            }
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_interval) => {}
            }
        }
        self.shutdown().await;
    }

    /// Close the session and leave the link in `Disconnected`.
    pub async fn shutdown(&self) {
        if tokio::time::timeout(DISCONNECT_TIMEOUT, self.client.disconnect())
            .await
            .is_err()
        {
            warn!(endpoint = %self.endpoint(), "Device disconnect timed out");
        }
        self.connected.store(false, Ordering::Release);
        self.state_tx.send_replace(LinkState::Disconnected);
        info!(endpoint = %self.endpoint(), "Device link closed");
    }

    fn on_device_error(
        &self,
        address: &str,
        err: DeviceError,
        kind: fn(String) -> SyncError,
    ) -> SyncError {
        if err.is_link_fault() {
            self.mark_disconnected(err.to_string());
            if matches!(err, DeviceError::NotConnected) {
                return SyncError::DeviceUnavailable;
            }
        } else {
            debug!(address, error = %err, "Device rejected request");
        }
        kind(err.to_string())
    }

    fn touch(&self) {
        let _ = self.last_success_at.lock().map(|mut t| *t = Some(Utc::now()));
    }

    fn set_last_error(&self, err: Option<String>) {
        let _ = self.last_error.lock().map(|mut e| *e = err);
    }
}

impl std::fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("endpoint", &self.endpoint())
            .field("connected", &self.is_connected())
            .finish()
    }
}
