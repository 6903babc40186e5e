//! Logging system configuration and initialization.
//!
//! Provides:
//! - Console output through `tracing-subscriber`'s fmt layer
//! - Optional file logging via `tracing-appender` (non-blocking writer)
//! - `RUST_LOG`-style filtering with the configured level as fallback
//! - Optional structured JSON output

use std::path::PathBuf;

use anyhow::Result;
use lazy_static::lazy_static;
use std::sync::Mutex;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

pub use crate::infrastructure::config::LoggingConfig;

// Keeps the non-blocking file writers alive for the process lifetime.
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> =
        Mutex::new(Vec::new());
}

/// Log directory next to the executable.
#[must_use]
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(std::path::Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());
    exe_dir.join("logs")
}

/// Initialize logging with the default configuration.
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Initialize logging from an explicit configuration.
///
/// Safe to call more than once; subsequent calls are no-ops because a global
/// subscriber is already installed.
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = vec![filter.boxed()];

    if config.console_output {
        let layer = fmt::layer().with_target(true);
        if config.json_format {
            layers.push(layer.json().boxed());
        } else {
            layers.push(layer.boxed());
        }
    }

    if config.file_output {
        let appender =
            tracing_appender::rolling::daily(get_log_directory(), "ads-metrics-overlay.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        if let Ok(mut guards) = LOG_GUARDS.lock() {
            guards.push(guard);
        }
        layers.push(fmt::layer().with_writer(writer).with_ansi(false).boxed());
    }

    if Registry::default().with(layers).try_init().is_err() {
        tracing::debug!("Logging already initialized, keeping existing subscriber");
    }
    Ok(())
}
