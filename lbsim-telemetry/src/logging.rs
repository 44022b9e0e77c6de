//! ## lbsim-telemetry::logging
//! **Structured logging with `tracing`**
//!
//! `RUST_LOG` takes precedence over the configured default level.

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global fmt subscriber. Safe to call more than once; later
    /// calls leave the first subscriber in place.
    pub fn init(default_level: &str) {
        let _ = fmt()
            .with_env_filter(Self::filter(default_level))
            .with_thread_names(true)
            .with_span_events(FmtSpan::CLOSE)
            .try_init();
    }

    fn filter(default_level: &str) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(default_level))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }

    /// Records a simulation lifecycle event with its key figures.
    #[inline]
    pub fn log_run_summary(sent: usize, dropped: u64, completed: u64, skipped: usize) {
        tracing::info!(
            sent,
            dropped,
            completed,
            skipped,
            "Simulation run finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[traced_test]
    #[test]
    fn test_run_summary_logging() {
        EventLogger::log_run_summary(10, 2, 8, 1);
        assert!(logs_contain("Simulation run finished"));
        assert!(logs_contain("dropped=2"));
    }

    #[test]
    fn test_filter_falls_back_on_garbage() {
        // An unparsable directive must not panic.
        let _ = EventLogger::filter("[[not a filter");
    }
}
