use crate::{DeviceResult, DeviceValue};
use async_trait::async_trait;

/// Minimal device session contract consumed by the device link.
///
/// Implementations own the protocol session handle. They do not reconnect on
/// their own: the link decides when to call [`DeviceClient::connect`] again.
#[async_trait]
pub trait DeviceClient: Send + Sync + 'static {
    /// Endpoint the client connects to, for status reporting.
    fn endpoint(&self) -> &str;

    /// Establish a fresh session, replacing any previous one.
    async fn connect(&self) -> DeviceResult<()>;

    /// Close the current session if any. Never fails.
    async fn disconnect(&self);

    /// Read the current value at `address`.
    async fn read(&self, address: &str) -> DeviceResult<DeviceValue>;

    /// Write `value` to `address`.
    async fn write(&self, address: &str, value: &DeviceValue) -> DeviceResult<()>;
}
