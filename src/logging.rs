//! Logging and tracing initialization for weatherd.
//!
//! Structured logging through the `tracing` ecosystem, either as compact
//! console output or as JSON for machine parsing.

use tracing::{Level, Subscriber};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

/// Configuration for the logging system.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogConfig {
    /// Output logs as JSON (for machine parsing)
    pub json: bool,
    /// Enable verbose logging (sets default level to DEBUG)
    pub verbose: bool,
}

/// The filter applied when `RUST_LOG` is not set.
fn default_directive(verbose: bool) -> String {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    format!("weatherd={}", level.as_str().to_lowercase())
}

/// Initialize the tracing subscriber with the given configuration.
///
/// Call once, early in `main`, after config is loaded. The level can be
/// overridden at runtime via the `RUST_LOG` environment variable.
///
/// # Examples
///
/// ```ignore
/// weatherd::logging::init(LogConfig { verbose: true, ..Default::default() });
/// ```
pub fn init(config: LogConfig) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config.verbose)));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer(config.json))
        .init();
}

/// JSON lines carry target and span context for aggregation. Console lines
/// stay compact; components identify themselves through the `server` field.
fn fmt_layer<S>(json: bool) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    if json {
        fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer().compact().with_target(false).boxed()
    }
}
