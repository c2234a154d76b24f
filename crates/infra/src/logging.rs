use anyhow::Result;
use tracing_subscriber::{EnvFilter, fmt};

use crate::config::AppConfig;

/// Structured JSON logs in production, compact human-readable output
/// everywhere else. `log_level` is an env-filter directive, so
/// per-target overrides like "info,palaver_api=debug" work.
pub fn init_tracing(config: &AppConfig) -> Result<()> {
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = fmt().with_env_filter(filter).with_target(false);
    if config.is_production() {
        builder.json().flatten_event(true).init();
    } else {
        builder.compact().init();
    }

    Ok(())
}
