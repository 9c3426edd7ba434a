//! Contracts shared between the synchronization engine and its adapters.
//!
//! The engine talks to the device only through [`DeviceClient`] and hands
//! persisted snapshots only to [`SnapshotStore`]; both speak in terms of the
//! protocol-neutral [`DeviceValue`] and [`Parameter`] types defined here.

pub mod client;
pub mod error;
pub mod model;
pub mod store;
pub mod value;

pub use client::DeviceClient;
pub use error::{DeviceError, DeviceResult, StoreError, StoreResult};
pub use model::Parameter;
pub use store::SnapshotStore;
pub use value::DeviceValue;
