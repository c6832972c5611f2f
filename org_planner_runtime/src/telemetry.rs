//! Logging setup.

use tracing_subscriber::EnvFilter;

use crate::config::PlannerConfig;

/// Install a fmt subscriber. `RUST_LOG` wins over `default_filter`.
/// Returns false when a global subscriber was already installed.
pub fn init_logging(default_filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_ok()
}

/// `init_logging` with the configured filter (`ORG_PLANNER_LOG`).
pub fn init_from_config(config: &PlannerConfig) -> bool {
    init_logging(&config.log_filter)
}
