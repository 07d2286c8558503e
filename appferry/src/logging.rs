//! Logging setup.
//!
//! Console output always; a daily rolling file when a directory is
//! configured. `APPFERRY_LOG` (or `RUST_LOG`) overrides the configured level.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Environment variable holding a filter directive.
pub const LOG_ENV: &str = "APPFERRY_LOG";

/// File name prefix of rolling log files.
const LOG_FILE_PREFIX: &str = "appferry.log";

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `appferry=debug,hyper=warn`.
    pub level: String,
    /// Directory for rolling log files; console only if `None`.
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: None,
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_directory(mut self, dir: PathBuf) -> Self {
        self.directory = Some(dir);
        self
    }
}

/// Keeps the file writer flushing. Hold it until the process exits.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// Calling this twice leaves the first subscriber in place.
pub fn init(config: &LoggingConfig) -> LoggingGuard {
    let (file_layer, guard) = match &config.directory {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(build_filter(&config.level));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let console_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(build_filter(&config.level));

    // Fails only when a subscriber is already set.
    let _ = tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init();

    LoggingGuard { _file: guard }
}

/// Filter from the environment, else from `level`, else `info`.
fn build_filter(level: &str) -> EnvFilter {
    for var in [LOG_ENV, EnvFilter::DEFAULT_ENV] {
        if let Ok(filter) = EnvFilter::try_from_env(var) {
            return filter;
        }
    }
    match level.parse::<EnvFilter>() {
        Ok(filter) => filter,
        Err(e) => {
            eprintln!(
                "WARN: log level '{}' is not a valid filter ({}); falling back to 'info'",
                level, e
            );
            EnvFilter::new("info")
        }
    }
}
