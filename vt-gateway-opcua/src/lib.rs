//! OPC UA adapter for the device link.

pub mod client;
pub mod codec;
pub mod types;

pub use client::OpcUaClient;
pub use codec::VariantCodec;
pub use types::{OpcUaAuth, OpcUaClientConfig};
