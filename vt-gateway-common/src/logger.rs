use std::{
    path::PathBuf,
    str::FromStr,
    sync::{Arc, Mutex},
};
use tracing::{subscriber::set_global_default, Level};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_subscriber::{
    filter::DynFilterFn,
    fmt::{self},
    layer::SubscriberExt,
    Layer, Registry,
};
use vt_gateway_error::{VTError, VTResult};

/// Console plus daily-rolling file logger with a level adjustable at runtime.
pub struct Logger {
    level: Arc<Mutex<Level>>,
    dir: PathBuf,
    file_name: String,
    _file_guard: Option<WorkerGuard>,
}

impl Logger {
    pub fn new(level: Option<Level>) -> Self {
        Logger {
            level: Arc::new(Mutex::new(level.unwrap_or(Level::INFO))),
            dir: PathBuf::from("logs"),
            file_name: "vt-gateway.log".to_string(),
            _file_guard: None,
        }
    }

    /// Directory and base file name of the rolling log file.
    pub fn with_file(mut self, dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        self.dir = dir.into();
        self.file_name = file_name.into();
        self
    }

    /// Parse a configured level name, falling back to `INFO` for unknown names.
    pub fn parse_level(name: &str) -> Level {
        Level::from_str(name.trim()).unwrap_or(Level::INFO)
    }

    #[inline]
    pub fn set_level(&self, new_level: Level) {
        if let Ok(mut level) = self.level.lock() {
            *level = new_level;
        }
    }

    #[inline]
    pub fn get_level(&self) -> Level {
        self.level.lock().map(|l| *l).unwrap_or(Level::INFO)
    }

    /// Installs the console and file layers as the global subscriber.
    ///
    /// Must be called once; the returned guard lives inside the logger, so the
    /// logger has to outlive the process work.
    pub fn initialize(&mut self) -> VTResult<()> {
        let file_appender = rolling::daily(&self.dir, &self.file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        self._file_guard = Some(guard);

        let console_filter = {
            let level = Arc::clone(&self.level);
            DynFilterFn::new(move |metadata, _| {
                level.lock().map(|l| metadata.level() <= &*l).unwrap_or(true)
            })
        };

        let file_filter = {
            let level = Arc::clone(&self.level);
            DynFilterFn::new(move |metadata, _| {
                level.lock().map(|l| metadata.level() <= &*l).unwrap_or(true)
            })
        };

        let console_layer = {
            #[cfg(debug_assertions)]
            let layer = fmt::layer()
                .pretty()
                .with_writer(std::io::stdout)
                .with_file(true)
                .with_line_number(true);

            #[cfg(not(debug_assertions))]
            let layer = fmt::layer()
                .with_writer(std::io::stdout)
                .with_file(false)
                .with_line_number(false);

            layer.with_filter(console_filter)
        };

        let file_layer = {
            #[cfg(debug_assertions)]
            let layer = fmt::layer()
                .pretty()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true);

            #[cfg(not(debug_assertions))]
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_file(false)
                .with_line_number(false);

            layer.with_filter(file_filter)
        };

        let subscriber = Registry::default().with(console_layer).with(file_layer);
        set_global_default(subscriber).map_err(|_| VTError::from("Failed to set logger"))?;
        Ok(())
    }
}
