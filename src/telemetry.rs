//! Tracing subscriber setup

use anyhow::{anyhow, Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Install the global subscriber
///
/// `RUST_LOG` directives are honored; the crate's own level comes from the
/// logging config. Fails (instead of panicking) if a subscriber is already set.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(
        format!("agent_wallet_fleet={}", config.level)
            .parse()
            .with_context(|| format!("Invalid log level: {}", config.level))?,
    );

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    }
    .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}
