// Logging setup
//
// Console logging through tracing-subscriber. The benchmark report is printed
// directly; everything else (setup failures, per-iteration errors, stress
// worker progress) goes through tracing.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Filter used when none is configured or the configured one does not parse
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Logging configuration
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Log filter (e.g., "info", "debug", "bulkbench_harness=debug")
    pub log_filter: Option<String>,
    /// Include the event target in each line
    pub with_target: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: None,
            with_target: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `RUST_LOG` or `LOG_LEVEL`: Log filter
    pub fn from_env() -> Self {
        Self {
            log_filter: std::env::var("RUST_LOG")
                .ok()
                .or_else(|| std::env::var("LOG_LEVEL").ok()),
            ..Default::default()
        }
    }

    /// Override the log filter (e.g. from a command-line flag)
    pub fn with_log_filter(mut self, filter: Option<String>) -> Self {
        if filter.is_some() {
            self.log_filter = filter;
        }
        self
    }

    /// Filter directives that will actually be applied
    pub fn effective_filter(&self) -> String {
        self.log_filter
            .as_deref()
            .filter(|f| EnvFilter::try_new(f).is_ok())
            .unwrap_or(DEFAULT_LOG_FILTER)
            .to_string()
    }
}

/// Install the global subscriber
///
/// Call once, at the top of `main`.
pub fn init_telemetry(config: TelemetryConfig) {
    let filter = EnvFilter::new(config.effective_filter());

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(config.with_target)
        .with_filter(filter);

    tracing_subscriber::registry().with(console_layer).init();

    if let Some(rejected) = config
        .log_filter
        .as_deref()
        .filter(|f| EnvFilter::try_new(f).is_err())
    {
        tracing::warn!(filter = %rejected, "invalid log filter, using default");
    }
}
