//! Tracing/logging initialization.
//!
//! Human-readable by default; set `LOG_FORMAT=json` for structured output
//! suitable for a log aggregator. `RUST_LOG` controls the filter as usual.

use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    let registry = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let _ = if json {
        registry.json().with_timer(tracing_subscriber::fmt::time::SystemTime).try_init()
    } else {
        registry.try_init()
    };
}
