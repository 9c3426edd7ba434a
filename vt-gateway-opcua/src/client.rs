use crate::{codec::VariantCodec, types::OpcUaClientConfig};
use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use futures::{pin_mut, StreamExt};
use opcua::{
    client::{
        ClientBuilder, IdentityToken, Session, SessionActivity, SessionEventLoop, SessionPollResult,
    },
    crypto::SecurityPolicy as UaSecurityPolicy,
    types::{MessageSecurityMode, NodeId, ReadValueId, TimestampsToReturn, WriteValue},
};
use std::{str::FromStr, sync::Arc, time::Duration};
use tokio::task::AbortHandle;
use url::Url;
use vt_gateway_sdk::{DeviceClient, DeviceError, DeviceResult, DeviceValue};

/// Session slot shared between the client and its event loop task.
struct SessionEntry {
    session: ArcSwapOption<Session>,
    last_error: std::sync::Mutex<Option<String>>,
}

impl SessionEntry {
    #[inline]
    fn new_empty() -> Self {
        Self {
            session: ArcSwapOption::from(None),
            last_error: std::sync::Mutex::new(None),
        }
    }

    #[inline]
    fn set_last_error(&self, msg: impl Into<String>) {
        let _ = self.last_error.lock().map(|mut e| *e = Some(msg.into()));
    }
}

/// OPC UA implementation of [`DeviceClient`].
///
/// Holds at most one session. The client never reconnects on its own; when the
/// event loop reports a lost connection the session slot is cleared and every
/// further call fails with [`DeviceError::NotConnected`] until the owner calls
/// [`DeviceClient::connect`] again.
pub struct OpcUaClient {
    config: OpcUaClientConfig,
    shared: Arc<SessionEntry>,
    event_loop: std::sync::Mutex<Option<AbortHandle>>,
}

impl OpcUaClient {
    pub fn new(config: OpcUaClientConfig) -> Self {
        Self {
            config,
            shared: Arc::new(SessionEntry::new_empty()),
            event_loop: std::sync::Mutex::new(None),
        }
    }

    #[inline]
    pub fn config(&self) -> &OpcUaClientConfig {
        &self.config
    }

    /// Last error reported by the session event loop, if any.
    pub fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().ok().and_then(|e| e.clone())
    }

    #[inline]
    fn current_session(&self) -> DeviceResult<Arc<Session>> {
        self.shared
            .session
            .load_full()
            .ok_or(DeviceError::NotConnected)
    }

    fn build_client(cfg: &OpcUaClientConfig) -> ClientBuilder {
        // Security policy None with anonymous or user/password identity needs no
        // application instance certificate.
        ClientBuilder::new()
            .application_name(&cfg.application_name)
            .application_uri(&cfg.application_uri)
            .pki_dir("./pki")
            .session_retry_limit(0)
            .session_timeout(cfg.session_timeout_ms)
            .trust_server_certs(false)
            .create_sample_keypair(false)
    }

    async fn connect_once(
        cfg: &OpcUaClientConfig,
    ) -> DeviceResult<(Arc<Session>, SessionEventLoop)> {
        let mut client = Self::build_client(cfg).client().map_err(|e| {
            DeviceError::ConnectFailed(format!("OPC UA build client error: {:?}", e))
        })?;
        let identity: IdentityToken = cfg.auth.clone().into();

        let url = cfg.endpoint.trim();
        let endpoints = client
            .get_server_endpoints_from_url(url)
            .await
            .map_err(|err| {
                DeviceError::ConnectFailed(format!(
                    "OPC UA get endpoints error from {url}: {err}"
                ))
            })?;

        let mut selected = endpoints
            .into_iter()
            .find(|ep| {
                ep.security_mode == MessageSecurityMode::None
                    && UaSecurityPolicy::from_uri(ep.security_policy_uri.as_ref())
                        == UaSecurityPolicy::None
            })
            .ok_or_else(|| {
                DeviceError::ConnectFailed(format!(
                    "No OPC UA endpoint without security offered at {url}"
                ))
            })?;

        // The configured URL is authoritative for host and port. Servers often
        // advertise a machine name that does not resolve from the gateway.
        let advertised = selected.endpoint_url.clone();
        if let (Ok(cfg_uri), Ok(mut ep_uri)) =
            (Url::parse(url), Url::parse(selected.endpoint_url.as_ref()))
        {
            if let Some(host) = cfg_uri.host_str() {
                if let Err(err) = ep_uri.set_host(Some(host)) {
                    tracing::debug!(error = ?err, "Failed to override OPC UA endpoint host");
                }
            }
            if let Some(port) = cfg_uri.port() {
                if ep_uri.set_port(Some(port)).is_err() {
                    tracing::debug!("Failed to override OPC UA endpoint port");
                }
            }
            selected.endpoint_url = ep_uri.to_string().into();
        }

        tracing::info!(
            endpoint_url = %selected.endpoint_url,
            advertised_endpoint_url = %advertised,
            "OPC UA selected endpoint for connection"
        );

        client
            .connect_to_endpoint_directly(selected, identity)
            .map_err(|e| DeviceError::ConnectFailed(format!("OPC UA connect-direct error: {e}")))
    }

    /// Drive the session event loop until the connection is lost or the stream ends.
    async fn run_event_loop(shared: Arc<SessionEntry>, session: Arc<Session>, ev: SessionEventLoop) {
        let stream = ev.enter();
        pin_mut!(stream);
        while let Some(item) = stream.next().await {
            match item {
                Ok(SessionPollResult::ConnectionLost(code)) => {
                    tracing::warn!(status = %code, "OPC UA connection lost");
                    shared.set_last_error(format!("connection lost: {code}"));
                    break;
                }
                Ok(SessionPollResult::SessionActivity(SessionActivity::KeepAliveFailed(code))) => {
                    tracing::debug!(status = %code, "OPC UA keep-alive failed");
                    shared.set_last_error(format!("keepalive failed: {code}"));
                }
                Ok(_) => {}
                Err(code) => {
                    tracing::warn!(status = %code, "OPC UA event loop error");
                    shared.set_last_error(format!("event loop error: {code}"));
                    break;
                }
            }
        }

        // Only clear the slot if a newer session has not replaced ours.
        let current = shared.session.load_full();
        if current.is_some_and(|s| Arc::ptr_eq(&s, &session)) {
            shared.session.store(None);
        }
    }

    fn take_event_loop(&self) -> Option<AbortHandle> {
        self.event_loop.lock().ok().and_then(|mut h| h.take())
    }

    fn set_event_loop(&self, handle: AbortHandle) {
        if let Ok(mut slot) = self.event_loop.lock() {
            *slot = Some(handle);
        }
    }
}

#[async_trait]
impl DeviceClient for OpcUaClient {
    fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    async fn connect(&self) -> DeviceResult<()> {
        self.disconnect().await;

        let connect_timeout = self.config.connect_timeout();
        let (session, ev) =
            match tokio::time::timeout(connect_timeout, Self::connect_once(&self.config)).await {
                Ok(res) => res?,
                Err(_elapsed) => return Err(DeviceError::Timeout(connect_timeout)),
            };

        let mut handle = tokio::spawn(Self::run_event_loop(
            Arc::clone(&self.shared),
            Arc::clone(&session),
            ev,
        ));
        // Registered before activation so a connect abandoned mid-way is still
        // torn down by the next `disconnect`.
        self.set_event_loop(handle.abort_handle());

        let activated = tokio::time::timeout(connect_timeout, async {
            tokio::select! {
                ok = session.wait_for_connection() => ok,
                _ = &mut handle => false,
            }
        })
        .await
        .unwrap_or(false);

        if !activated || handle.is_finished() {
            handle.abort();
            let _ = self.take_event_loop();
            session.disable_reconnects();
            let _ = tokio::time::timeout(Duration::from_secs(2), session.disconnect()).await;
            let reason = self
                .last_error()
                .unwrap_or_else(|| "session was not activated".to_string());
            return Err(DeviceError::ConnectFailed(reason));
        }

        self.shared.session.store(Some(session));
        tracing::info!(endpoint = %self.config.endpoint, "OPC UA session activated");
        Ok(())
    }

    async fn disconnect(&self) {
        let session = self.shared.session.swap(None);
        if let Some(session) = session {
            session.disable_reconnects();
            let _ = tokio::time::timeout(Duration::from_secs(2), session.disconnect()).await;
        }
        if let Some(handle) = self.take_event_loop() {
            handle.abort();
        }
    }

    async fn read(&self, address: &str) -> DeviceResult<DeviceValue> {
        let node_id = NodeId::from_str(address)
            .map_err(|_| DeviceError::InvalidAddress(address.to_string()))?;
        let session = self.current_session()?;
        let timeout = self.config.request_timeout();

        let values = match tokio::time::timeout(
            timeout,
            session.read(&[ReadValueId::new_value(node_id)], TimestampsToReturn::Neither, 0.0),
        )
        .await
        {
            Ok(Ok(values)) => values,
            Ok(Err(sc)) => return Err(DeviceError::SessionError(format!("OPC UA read status: {sc}"))),
            Err(_elapsed) => return Err(DeviceError::Timeout(timeout)),
        };

        let dv = values.into_iter().next().ok_or_else(|| {
            DeviceError::SessionError("OPC UA read returned no value".to_string())
        })?;
        if let Some(status) = dv.status.as_ref().filter(|s| s.is_bad()) {
            return Err(DeviceError::Rejected {
                address: address.to_string(),
                status: status.to_string(),
            });
        }
        Ok(dv
            .value
            .as_ref()
            .map(VariantCodec::to_device_value)
            .unwrap_or(DeviceValue::Null))
    }

    async fn write(&self, address: &str, value: &DeviceValue) -> DeviceResult<()> {
        let node_id = NodeId::from_str(address)
            .map_err(|_| DeviceError::InvalidAddress(address.to_string()))?;
        let variant = VariantCodec::to_variant(value)?;
        let session = self.current_session()?;
        let timeout = self.config.request_timeout();

        let write = WriteValue::value_attr(node_id, variant);
        let sc_list = match tokio::time::timeout(timeout, session.write(&[write])).await {
            Ok(Ok(list)) => list,
            Ok(Err(sc)) => {
                return Err(DeviceError::SessionError(format!("OPC UA write status: {sc}")))
            }
            Err(_elapsed) => return Err(DeviceError::Timeout(timeout)),
        };

        if let Some(bad) = sc_list.iter().find(|s| !s.is_good()) {
            return Err(DeviceError::Rejected {
                address: address.to_string(),
                status: bad.to_string(),
            });
        }
        Ok(())
    }
}
