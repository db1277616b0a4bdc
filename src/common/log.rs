//! Logging setup emitting JSON lines through `tracing`.
//!
//! Call sites use the `tracing` macros with the `event`, `code` and `dur_ms` fields so
//! every line carries the same schema.

use tracing_subscriber::EnvFilter;

use crate::common::config::AppCfg;

/// Install the global JSON subscriber. `RUST_LOG` overrides the configured level.
///
/// Safe to call more than once; only the first call installs a subscriber.
pub fn init(cfg: &AppCfg) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log_level));

    let _ = tracing_subscriber::fmt()
        .json()
        .with_current_span(false)
        .with_target(true)
        .with_env_filter(filter)
        .try_init();
}
