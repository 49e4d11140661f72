//! # Observability
//!
//! Process-wide tracing setup for the AdCider attribution crates.
//!
//! Library code only ever uses the standard `tracing` macros. The host
//! application (or the SDK facade on its behalf) calls [`init_with_config`].
//! The first call installs the global subscriber; later calls only swap the
//! level filter, so re-initializing the SDK never panics and still picks up
//! a new level.
//!
//! ## Usage
//!
//! ```rust,ignore
//! observability::init_with_config(observability::LogConfig {
//!     service_name: "adcider".into(),
//!     default_level: "debug".into(),
//!     log_path: Some("/tmp/adcider.jsonl".into()),
//!     ..Default::default()
//! });
//!
//! tracing::info!("ready");
//! ```

mod file;
mod json_layer;

use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

pub use file::{LogFileWriter, WriterFactory};
pub use json_layer::{JsonLayer, LogEntry};

/// Configuration for the logging system.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Name written into every JSONL entry.
    pub service_name: String,

    /// Default filter directive (e.g. "debug", "warn", "off").
    /// Can be overridden by the `RUST_LOG` environment variable.
    pub default_level: String,

    /// Optional JSONL log file. When absent only stderr output is installed.
    pub log_path: Option<PathBuf>,

    /// Emit compact human-readable lines to stderr.
    pub also_stderr: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".into(),
            default_level: "info".into(),
            log_path: None,
            also_stderr: true,
        }
    }
}

/// Initialize logging with default settings for `service_name`.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(service_name: &str) -> bool {
    init_with_config(LogConfig {
        service_name: service_name.into(),
        ..Default::default()
    })
}

static FILTER: OnceLock<reload::Handle<EnvFilter, Registry>> = OnceLock::new();

/// Initialize logging with a custom configuration.
///
/// Returns `true` when this call installed the global subscriber. When one
/// was already installed by this crate, only its level filter is replaced
/// and `false` is returned; outputs stay as first configured.
pub fn init_with_config(config: LogConfig) -> bool {
    if FILTER.get().is_some() {
        set_level(&config.default_level);
        return false;
    }

    let (filter, handle) = reload::Layer::new(build_filter(&config.default_level));

    let json_layer = match &config.log_path {
        Some(path) => match LogFileWriter::new(path) {
            Ok(writer) => Some(JsonLayer::new(
                config.service_name.clone(),
                WriterFactory::new(writer),
            )),
            Err(e) => {
                eprintln!("failed to open log file {}: {}", path.display(), e);
                None
            }
        },
        None => None,
    };

    let stderr_layer = if config.also_stderr {
        Some(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_writer(std::io::stderr),
        )
    } else {
        None
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(stderr_layer)
        .try_init()
        .is_ok();

    if installed {
        let _ = FILTER.set(handle);
        tracing::debug!(
            service = %config.service_name,
            level = %config.default_level,
            "observability initialized"
        );
    }

    installed
}

/// Replace the active level filter. Returns `false` when this crate has not
/// installed a subscriber.
pub fn set_level(level: &str) -> bool {
    match FILTER.get() {
        Some(handle) => handle.reload(build_filter(level)).is_ok(),
        None => false,
    }
}

fn build_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

pub use tracing::{debug, error, info, instrument, trace, warn};
pub use tracing::Level;
