//! Logging and tracing initialization.
//!
//! Module code logs through the `log` facade; those records are bridged into
//! the `tracing` subscriber installed here, so job spans and plain log lines
//! end up in the same output.

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Configuration for the logging system.
#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    /// Output logs as JSON
    pub json: bool,
    /// Sets the default level to DEBUG
    pub verbose: bool,
}

fn default_filter(verbose: bool) -> String {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    format!("director={}", level.as_str().to_lowercase())
}

/// Installs the global subscriber. `RUST_LOG` overrides the default filter.
///
/// Returns false when a subscriber was already installed, in which case the
/// call changes nothing.
pub fn init(config: LogConfig) -> bool {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(config.verbose)));

    let installed = if config.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_span_events(FmtSpan::CLOSE)
                    .with_current_span(true)
                    .with_target(true),
            )
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_names(true)
                    .with_file(false)
                    .with_line_number(false),
            )
            .try_init()
            .is_ok()
    };

    // No-op when try_init already bridged `log`.
    let _ = tracing_log::LogTracer::init();
    installed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter(false), "director=info");
        assert_eq!(default_filter(true), "director=debug");
    }

    #[test]
    #[serial]
    fn test_init_is_idempotent() {
        init(LogConfig::default());
        assert!(!init(LogConfig {
            verbose: true,
            ..Default::default()
        }));
        log::info!("still logging");
    }
}
