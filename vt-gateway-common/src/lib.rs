pub mod logger;

use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::info;
use vt_gateway_error::{VTError, VTResult};

pub use logger::Logger;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Wait for a termination signal or for `shutdown_token` to be cancelled.
pub async fn listen_for_shutdown(shutdown_token: CancellationToken) -> VTResult<()> {
    #[cfg(unix)]
    {
        let register = |kind: SignalKind, name: &str| {
            signal(kind).map_err(|e| {
                VTError::InitializationError(format!("failed to register {name} handler: {e}"))
            })
        };
        let mut sigterm = register(SignalKind::terminate(), "SIGTERM")?;
        let mut sigint = register(SignalKind::interrupt(), "SIGINT")?;
        let mut sighup = register(SignalKind::hangup(), "SIGHUP")?;
        let mut sigquit = register(SignalKind::quit(), "SIGQUIT")?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM signal");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT signal");
            }
            _ = sighup.recv() => {
                info!("Received SIGHUP signal");
            }
            _ = sigquit.recv() => {
                info!("Received SIGQUIT signal");
            }
            _ = shutdown_token.cancelled() => {}
        }
    }

    #[cfg(windows)]
    {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received ctrl-c signal");
            }
            _ = shutdown_token.cancelled() => {}
        }
    }

    Ok(())
}

/// Apply the configured runtime directory by switching the process working directory.
///
/// Relative paths in the configuration (mapping document, snapshot dir, log dir,
/// `./pki`) resolve against it afterwards.
pub fn apply_runtime_dir(runtime_dir: &str) -> VTResult<()> {
    let dir = runtime_dir.trim();
    if dir.is_empty() || dir == "." {
        return Ok(());
    }

    std::fs::create_dir_all(dir)
        .map_err(|e| VTError::from(format!("Failed to create runtime_dir {}: {}", dir, e)))?;

    std::env::set_current_dir(dir).map_err(|e| {
        VTError::from(format!(
            "Failed to set current_dir to runtime_dir {}: {}",
            dir, e
        ))
    })?;

    Ok(())
}

/// Ensure the given runtime directories exist. Safe to call repeatedly.
pub fn ensure_runtime_directories<P: AsRef<Path>>(dirs: &[P]) -> VTResult<()> {
    for dir in dirs {
        let dir = dir.as_ref();
        if let Err(e) = std::fs::create_dir_all(dir) {
            return Err(VTError::from(format!(
                "Failed to create directory {}: {}",
                dir.display(),
                e
            )));
        }
    }
    Ok(())
}
