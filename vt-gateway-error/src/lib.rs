pub mod sync;

use anyhow::Error as AnyhowError;
use config::ConfigError;
use serde_json::Error as SerdeJsonError;
use std::io::Error as IoError;
use thiserror::Error;
use tokio::{task::JoinError, time::Duration};

pub use sync::{SyncError, SyncResult};

pub type VTResult<T, E = VTError> = anyhow::Result<T, E>;

#[derive(Error, Debug, Default)]
pub enum VTError {
    #[error("service unavailable")]
    #[default]
    ServiceUnavailable,
    #[error("read/write timeout")]
    Timeout(Duration),
    #[error("{0}")]
    JoinError(#[from] JoinError),
    #[error("{0}")]
    IoError(#[from] IoError),
    #[error("{0}")]
    Msg(String),
    #[error("{0}")]
    Anyhow(#[from] AnyhowError),
    #[error("{0}")]
    Json(#[from] SerdeJsonError),
    #[error("{0}")]
    ConfigError(#[from] ConfigError),
    #[error("{0}")]
    Sync(#[from] SyncError),
    #[error("Mapping error: {0}")]
    Mapping(String),
    #[error("Initialization error: {0}")]
    InitializationError(String),
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

impl From<String> for VTError {
    #[inline]
    fn from(e: String) -> Self {
        VTError::Msg(e)
    }
}

impl From<&str> for VTError {
    #[inline]
    fn from(e: &str) -> Self {
        VTError::Msg(e.to_string())
    }
}
