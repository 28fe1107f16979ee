//! Logging setup for a controller process.
//!
//! Structured logs are the controller's primary observable surface; every
//! state transition, election, and fencing decision is traced. This module
//! wires `tracing-subscriber` with either human-readable or JSON output.
//!
//! # Environment Variables
//!
//! - `LOG_FORMAT`: `json` or `pretty` (default: `pretty`)
//! - `RUST_LOG`: level filter, e.g. `conductor=debug` (default: `info`)
//!
//! ```rust,no_run
//! use conductor::telemetry;
//!
//! telemetry::init_from_env().expect("logging setup failed");
//! ```

use tracing_subscriber::EnvFilter;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable output for development.
    #[default]
    Pretty,
    /// One JSON object per line, for log aggregators.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        })
    }
}

impl LogFormat {
    /// Read from the `LOG_FORMAT` environment variable.
    pub fn from_env() -> Self {
        std::env::var("LOG_FORMAT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }
}

/// Install the global tracing subscriber with the given output format.
///
/// Level filtering comes from `RUST_LOG`, defaulting to `info`. Returns an
/// error if a global subscriber is already installed.
pub fn init_logging(format: LogFormat) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().try_init()?,
        LogFormat::Pretty => builder.try_init()?,
    }
    Ok(())
}

/// Install the global tracing subscriber, taking the format from the
/// environment.
pub fn init_from_env() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    init_logging(LogFormat::from_env())
}
