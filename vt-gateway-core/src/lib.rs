//! Tag mapping and synchronization engine for the valve test rig gateway.
//!
//! The [`TagMap`] turns logical `(block, group, parameter)` names into device
//! addresses. [`SyncOrchestrator`] reads, writes and triggers commands through
//! the single [`DeviceLink`]. [`CachePoller`] and [`ChangeWatcher`] run in the
//! background against the same orchestrator, driven by [`VTGateway`].

pub mod cache;
pub mod codec;
pub mod command;
pub mod gateway;
pub mod link;
pub mod orchestrator;
pub mod resolver;
pub mod tagmap;
pub mod views;
pub mod watcher;

pub use cache::{CacheConfig, CachePoller, CacheSnapshot, CacheStore, ChannelStatus, GlobalData, UnitStatus};
pub use codec::ValueCodec;
pub use command::CommandMatch;
pub use gateway::VTGateway;
pub use link::{DeviceLink, DeviceLinkState, LinkConfig, LinkState};
pub use orchestrator::{BlockData, GroupData, GroupWriteReport, SyncOrchestrator};
pub use resolver::{GroupInfo, Lookup};
pub use tagmap::{TagEntry, TagMap};
pub use views::{GroupShape, GroupView};
pub use watcher::{ChangeWatcher, MonitoredGroup, PollOutcome, WatcherConfig};
