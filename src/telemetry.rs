//! Logging setup for controller processes.
//!
//! ```rust,no_run
//! use kafkaesque_controller::telemetry::{LogFormat, init_logging};
//!
//! init_logging(LogFormat::from_env()).expect("Failed to init logging");
//! ```
//!
//! Environment:
//!
//! - `LOG_FORMAT`: `json` or `pretty` (default: `pretty`)
//! - `RUST_LOG`: filter directives (default: `info`)
//! - `NO_COLOR`: disables ANSI colours in pretty output

use tracing::Span;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::types::NodeId;

/// Error returned when a global subscriber cannot be installed.
pub type LoggingError = Box<dyn std::error::Error + Send + Sync>;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Pretty,
    /// One JSON object per event, fields flattened to the top level.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
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

    pub fn as_str(&self) -> &'static str {
        match self {
            LogFormat::Pretty => "pretty",
            LogFormat::Json => "json",
        }
    }
}

/// Subscriber settings.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub format: LogFormat,
    /// Directive used when `RUST_LOG` is unset or unparsable.
    pub default_directive: String,
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            default_directive: "info".to_string(),
            ansi: true,
        }
    }
}

impl LoggingConfig {
    pub fn from_env() -> Self {
        Self {
            format: LogFormat::from_env(),
            ansi: std::env::var_os("NO_COLOR").is_none(),
            ..Self::default()
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))
    }

    /// Install the global subscriber. Fails if one is already installed.
    pub fn init(&self) -> Result<(), LoggingError> {
        let registry = tracing_subscriber::registry().with(self.filter());
        match self.format {
            LogFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json().flatten_event(true))
                .try_init()?,
            LogFormat::Pretty => registry
                .with(tracing_subscriber::fmt::layer().with_ansi(self.ansi))
                .try_init()?,
        }
        Ok(())
    }
}

/// Initialize logging in `format` with the default filter.
pub fn init_logging(format: LogFormat) -> Result<(), LoggingError> {
    LoggingConfig {
        format,
        ..LoggingConfig::default()
    }
    .init()
}

/// Span that tags everything a controller node logs with its id.
pub fn node_span(node_id: &NodeId) -> Span {
    tracing::info_span!("controller", node_id = %node_id)
}
