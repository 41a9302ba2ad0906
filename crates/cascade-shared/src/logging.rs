//! # Logging Setup
//!
//! Tracing subscriber initialization. Called once, first thing in `main`.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// Filtering comes from `RUST_LOG` when set, defaulting to `info`. With
/// `json = true` log lines are emitted as JSON objects for ingestion.
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_current_span(false)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
