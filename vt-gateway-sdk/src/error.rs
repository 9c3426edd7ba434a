use std::time::Duration;
use thiserror::Error;

pub type DeviceResult<T, E = DeviceError> = Result<T, E>;
pub type StoreResult<T, E = StoreError> = Result<T, E>;

/// Errors reported by a [`crate::DeviceClient`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    #[error("not connected")]
    NotConnected,
    #[error("connect failed: {0}")]
    ConnectFailed(String),
    #[error("session error: {0}")]
    SessionError(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid address '{0}'")]
    InvalidAddress(String),
    /// The device answered, but refused the value or the node.
    #[error("'{address}' rejected: {status}")]
    Rejected { address: String, status: String },
    #[error("codec error: {0}")]
    CodecError(String),
}

impl DeviceError {
    /// True when the error says the connection itself is gone or unusable.
    ///
    /// Rejections and address/codec problems come back from a live session and
    /// leave the connection intact.
    #[inline]
    pub fn is_link_fault(&self) -> bool {
        matches!(
            self,
            DeviceError::NotConnected
                | DeviceError::ConnectFailed(_)
                | DeviceError::SessionError(_)
                | DeviceError::Transport(_)
                | DeviceError::Timeout(_)
        )
    }
}

/// Errors reported by a [`crate::SnapshotStore`].
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
