//! Structured logging setup.
//!
//! [`init`] installs the global subscriber once and hands back a
//! [`TelemetryGuard`]; `main` keeps the guard for the life of the process
//! and calls [`TelemetryGuard::shutdown`] last so buffered output is
//! flushed before exit.

use std::io::Write;
use std::str::FromStr;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "tenmin_worker=debug,tenmin_pipeline=debug,tenmin_vision=info,tenmin_events=info,tenmin_db=info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format {other:?}")),
        }
    }
}

#[must_use = "dropping the guard ends the logging lifecycle"]
pub struct TelemetryGuard {
    format: LogFormat,
}

impl TelemetryGuard {
    pub fn format(&self) -> LogFormat {
        self.format
    }

    /// Flush pending output. Consumes the guard.
    pub fn shutdown(self) {
        tracing::info!("Logging shut down");
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
    }
}

/// Install the global subscriber. `RUST_LOG` overrides the default filter.
pub fn init(format: LogFormat) -> TelemetryGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).flatten_event(true))
            .init(),
    }

    TelemetryGuard { format }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_format_parses_case_insensitively() {
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert!("xml".parse::<LogFormat>().is_err());
    }
}
