//! # hubbub-logging
//!
//! Structured logging with `tracing`.
//!
//! [`init_subscriber`] installs the global subscriber once at startup. The
//! filter comes from `RUST_LOG` when set, otherwise from the configured
//! level. Development runs get compact human-readable lines on stderr;
//! production runs get one JSON object per event, with the span list so the
//! `session_id` recorded on session spans travels with every line.

#![deny(unsafe_code)]

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

/// Output format for log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Compact text for terminals.
    #[default]
    Compact,
    /// Newline-delimited JSON for log shippers.
    Json,
}

/// Build the filter: `RUST_LOG` wins, `level` is the fallback.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initialize the global tracing subscriber.
///
/// Returns `false` if a global subscriber was already installed, in which
/// case the call is a no-op.
pub fn init_subscriber(level: &str, format: LogFormat) -> bool {
    let filter = build_filter(level);

    match format {
        LogFormat::Compact => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .compact()
            .try_init()
            .is_ok(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .try_init()
            .is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_format_is_compact() {
        assert_eq!(LogFormat::default(), LogFormat::Compact);
    }

    #[test]
    fn filter_falls_back_to_level() {
        let filter = build_filter("debug");
        // RUST_LOG may be set by the test runner; either way a filter is built.
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn second_init_is_a_no_op() {
        let _ = init_subscriber("warn", LogFormat::Compact);
        assert!(!init_subscriber("warn", LogFormat::Json));
    }
}
