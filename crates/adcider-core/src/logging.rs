//! Logging initialization.
//!
//! The SDK exposes five levels (`debug`, `info`, `warning`, `error`, `none`)
//! and maps them onto `tracing` filter directives before handing off to the
//! observability package.

use std::path::PathBuf;

/// SDK log level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    None,
}

impl LogLevel {
    /// Parse a level name; unknown names fall back to `Warning`.
    pub fn parse(level: &str) -> Self {
        match level.trim().to_ascii_lowercase().as_str() {
            "trace" | "debug" => LogLevel::Debug,
            "info" => LogLevel::Info,
            "warn" | "warning" => LogLevel::Warning,
            "error" => LogLevel::Error,
            "none" | "off" => LogLevel::None,
            _ => LogLevel::Warning,
        }
    }

    /// The `EnvFilter` directive for this level.
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
            LogLevel::None => "off",
        }
    }
}

/// Map an SDK level name to a filter directive.
pub fn parse_level_directive(level: &str) -> &'static str {
    LogLevel::parse(level).directive()
}

/// Install the process-wide subscriber.
///
/// Safe to call repeatedly: the first call installs the subscriber and later
/// calls switch it to `level`. Returns whether this call did the installation.
pub fn init_logging(level: &str, log_path: Option<PathBuf>) -> bool {
    observability::init_with_config(observability::LogConfig {
        service_name: "adcider".into(),
        default_level: parse_level_directive(level).into(),
        log_path,
        also_stderr: true,
    })
}
