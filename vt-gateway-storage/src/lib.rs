mod snapshot;

pub use snapshot::JsonFileSnapshotStore;
