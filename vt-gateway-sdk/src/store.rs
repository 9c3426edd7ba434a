use crate::{Parameter, StoreResult};
use async_trait::async_trait;

/// Persistence sink for group snapshots taken on readiness-counter increments.
#[async_trait]
pub trait SnapshotStore: Send + Sync + 'static {
    /// Persist one snapshot of `group` in `block`, tagged with the counter value
    /// that triggered it.
    async fn save_group_snapshot(
        &self,
        block: u16,
        group: &str,
        counter: i64,
        parameters: &[Parameter],
    ) -> StoreResult<()>;
}
