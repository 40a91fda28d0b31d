//! Logging setup
//!
//! Console output is always on. With file output enabled, logs are also
//! written to rolling files under the configured directory:
//! - main/ - every event, JSON
//! - error/ - WARN and ERROR only
//! - server/ - event loop, reporter and stats API
//! - loadgen/ - load generator

use crate::infrastructure::config::LoggingConfig;
use std::fs;
use std::io;
use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize logging
///
/// `RUST_LOG` takes precedence over `config.level`.
/// Returns the appender guards, which must be kept alive for the duration
/// of the program.
pub fn init_logging(config: &LoggingConfig) -> io::Result<Vec<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let mut guards = Vec::new();

    let (main_layer, error_layer, server_layer, loadgen_layer) = if config.file_output {
        let dir = config.directory.as_path();
        create_log_dirs(dir)?;

        let (main_appender, main_guard) = create_appender(dir, "main");
        guards.push(main_guard);
        let (error_appender, error_guard) = create_appender(dir, "error");
        guards.push(error_guard);
        let (server_appender, server_guard) = create_appender(dir, "server");
        guards.push(server_guard);
        let (loadgen_appender, loadgen_guard) = create_appender(dir, "loadgen");
        guards.push(loadgen_guard);

        let main_layer = tracing_subscriber::fmt::layer()
            .with_writer(main_appender)
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_thread_ids(true)
            .with_thread_names(true)
            .json();

        let error_layer = tracing_subscriber::fmt::layer()
            .with_writer(error_appender)
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_filter(tracing_subscriber::filter::LevelFilter::WARN);

        let server_layer = tracing_subscriber::fmt::layer()
            .with_writer(server_appender)
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
                is_server_target(metadata.target())
            }));

        let loadgen_layer = tracing_subscriber::fmt::layer()
            .with_writer(loadgen_appender)
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_thread_names(true)
            .with_filter(tracing_subscriber::filter::filter_fn(|metadata| {
                is_loadgen_target(metadata.target())
            }));

        (
            Some(main_layer),
            Some(error_layer),
            Some(server_layer),
            Some(loadgen_layer),
        )
    } else {
        (None, None, None, None)
    };

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_level(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(main_layer)
        .with(error_layer)
        .with(server_layer)
        .with(loadgen_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    if config.file_output {
        tracing::info!("Logging initialized, files in {}", config.directory.display());
    }

    Ok(guards)
}

const LOG_TYPES: [&str; 4] = ["main", "error", "server", "loadgen"];

fn create_log_dirs(dir: &Path) -> io::Result<()> {
    for log_type in LOG_TYPES {
        fs::create_dir_all(dir.join(log_type))?;
    }
    Ok(())
}

/// Events for logs/server: the `server` target plus the event loop and
/// cold-path modules
fn is_server_target(target: &str) -> bool {
    target == "server"
        || target.starts_with("udp_engine::engine")
        || target.starts_with("udp_engine::infrastructure")
}

/// Events for logs/loadgen
fn is_loadgen_target(target: &str) -> bool {
    target == "loadgen" || target.starts_with("udp_engine::loadgen")
}

/// Create a daily rolling, non-blocking file appender
fn create_appender(dir: &Path, name: &str) -> (NonBlocking, WorkerGuard) {
    let appender = RollingFileAppender::new(Rotation::DAILY, dir.join(name), name);
    tracing_appender::non_blocking(appender)
}

/// Log helpers scoped to a target
#[macro_export]
macro_rules! log_server {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "server", $level, $($arg)+)
    };
}

#[macro_export]
macro_rules! log_loadgen {
    ($level:expr, $($arg:tt)+) => {
        tracing::event!(target: "loadgen", $level, $($arg)+)
    };
}
