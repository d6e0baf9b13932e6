//! # logview-logging
//!
//! Process-wide tracing setup for the logview server.
//!
//! ## Log Formats
//!
//! - `Pretty` - Multi-line human-readable output
//! - `JSON` - Structured JSON lines
//! - `Compact` - Single-line text output (default)
//!
//! `RUST_LOG` takes precedence over the configured level.

mod format;

pub use format::LogFormat;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing for the application.
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(level: &str, format: LogFormat) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let result = match format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(false))
            .try_init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .try_init(),
        LogFormat::Compact => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact().with_target(false))
            .try_init(),
    };

    result.map_err(|e| format!("Failed to initialize tracing: {}", e))
}
