//! Shared configuration, file layout, errors and logging setup for the
//! AdCider attribution crates.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_BACKEND_URL, DEFAULT_BACKOFF_BASE_SECS, DEFAULT_BACKOFF_MAX_SECS,
    DEFAULT_LOG_LEVEL, DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT_SECS,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, parse_level_directive, LogLevel};
pub use paths::Paths;
