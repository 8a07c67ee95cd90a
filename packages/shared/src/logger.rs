//! Logging setup utilities for the Hiroba chat gateway.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Output format of the log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human readable, colored output
    #[default]
    Pretty,
    /// One JSON object per line, for log shippers
    Json,
}

impl LogFormat {
    /// Parse a format name (`pretty` / `json`), falling back to `Pretty`.
    pub fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Build the default filter directive for the given binary.
///
/// Both the library crate of the caller (`crate_name`) and the binary get the
/// same level so that log lines from either side show up.
pub fn default_directive(crate_name: &str, binary_name: &str, default_log_level: &str) -> String {
    format!(
        "{}={},{}={},tower_http={}",
        crate_name.replace('-', "_"),
        default_log_level,
        binary_name.replace('-', "_"),
        default_log_level,
        default_log_level
    )
}

/// Initialize the tracing subscriber with the specified default log level.
///
/// The log level can be overridden using the `RUST_LOG` environment variable.
///
/// # Arguments
///
/// * `crate_name` - The library crate whose logs should be enabled (e.g., "hiroba-server")
/// * `binary_name` - The name of the binary (e.g., "hiroba-server")
/// * `default_log_level` - The default log level (e.g., "debug", "info", "warn", "error")
/// * `format` - Output format
///
/// # Examples
///
/// ```no_run
/// use hiroba_shared::logger::{LogFormat, setup_logger};
///
/// setup_logger("hiroba-server", "hiroba-server", "debug", LogFormat::Pretty);
/// ```
pub fn setup_logger(
    crate_name: &str,
    binary_name: &str,
    default_log_level: &str,
    format: LogFormat,
) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_directive(crate_name, binary_name, default_log_level).into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(false))
            .init(),
    }
}
