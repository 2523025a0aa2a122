//! Subscriber setup

use quad_core::{Error, LogFormat, ObservabilityConfig, Result};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// `RUST_LOG` when set, otherwise the configured filter
pub fn env_filter(config: &ObservabilityConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_filter))
}

/// Install the global subscriber.
///
/// Call once at startup; a second call returns an error and leaves the
/// first subscriber in place.
///
/// # Example
///
/// ```rust,no_run
/// use quad_core::ObservabilityConfig;
/// use quad_telemetry::init_telemetry;
///
/// init_telemetry(&ObservabilityConfig::default()).unwrap();
/// ```
pub fn init_telemetry(config: &ObservabilityConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(env_filter(config));

    let installed = match config.log_format {
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(true),
            )
            .try_init(),
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_thread_ids(false)
                    .with_line_number(true),
            )
            .try_init(),
    };

    installed.map_err(|e| Error::message(format!("Failed to install tracing subscriber: {}", e)))
}
