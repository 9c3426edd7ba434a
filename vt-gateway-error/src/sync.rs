use thiserror::Error;

pub type SyncResult<T, E = SyncError> = Result<T, E>;

/// Failure kinds surfaced by the read/write/command operations.
///
/// Mapping problems (`NoMappingForBlock`, `GroupNotFound`, `ParameterNotFound`,
/// `CommandNotMapped`) come from configuration and will not go away on retry.
/// `DeviceUnavailable` is transient: the link's reconnect loop restores the
/// connection, callers decide whether to call again.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("no mapping for block {block}")]
    NoMappingForBlock { block: u16 },

    #[error("group '{group}' not found in block {block}")]
    GroupNotFound { block: u16, group: String },

    #[error("parameter '{param}' not found in group '{group}' of block {block}")]
    ParameterNotFound {
        block: u16,
        group: String,
        param: String,
    },

    #[error("no command entry for '{test_type}_{action}' in block {block}")]
    CommandNotMapped {
        block: u16,
        test_type: String,
        action: String,
    },

    #[error("device unavailable")]
    DeviceUnavailable,

    #[error("read failed: {0}")]
    ReadFailed(String),

    #[error("write failed: {0}")]
    WriteFailed(String),
}

impl SyncError {
    /// Whether calling again later may succeed without a configuration change.
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SyncError::DeviceUnavailable | SyncError::ReadFailed(_) | SyncError::WriteFailed(_)
        )
    }

    #[inline]
    pub fn parameter_not_found(block: u16, group: &str, param: &str) -> Self {
        SyncError::ParameterNotFound {
            block,
            group: group.to_string(),
            param: param.to_string(),
        }
    }

    #[inline]
    pub fn group_not_found(block: u16, group: &str) -> Self {
        SyncError::GroupNotFound {
            block,
            group: group.to_string(),
        }
    }
}
