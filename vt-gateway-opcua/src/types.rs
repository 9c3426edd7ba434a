use opcua::client::{IdentityToken, Password};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the device OPC UA server.
///
/// Only the `None` security policy is used; the test rig sits on an isolated
/// cell network.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpcUaClientConfig {
    /// Discovery/endpoint URL, e.g. `opc.tcp://192.168.0.1:4840`.
    pub endpoint: String,
    pub application_name: String,
    pub application_uri: String,
    /// Requested session timeout in milliseconds.
    pub session_timeout_ms: u32,
    /// Upper bound for a single read or write service call.
    pub request_timeout_ms: u64,
    /// Upper bound for endpoint discovery plus session activation.
    pub connect_timeout_ms: u64,
    pub auth: OpcUaAuth,
}

impl OpcUaClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    #[inline]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[inline]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for OpcUaClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "opc.tcp://127.0.0.1:4840".to_string(),
            application_name: "vt-gateway".to_string(),
            application_uri: "urn:vt-gateway".to_string(),
            session_timeout_ms: 60_000,
            request_timeout_ms: 5_000,
            connect_timeout_ms: 10_000,
            auth: OpcUaAuth::Anonymous,
        }
    }
}

/// User identity presented when activating the session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OpcUaAuth {
    #[default]
    Anonymous,
    UserPassword { username: String, password: String },
}

impl From<OpcUaAuth> for IdentityToken {
    fn from(value: OpcUaAuth) -> Self {
        match value {
            OpcUaAuth::Anonymous => IdentityToken::Anonymous,
            OpcUaAuth::UserPassword { username, password } => {
                IdentityToken::UserName(username, Password::new(password))
            }
        }
    }
}
