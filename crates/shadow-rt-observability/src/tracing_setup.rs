//! Tracing subscriber setup.

use shadow_rt_core::{Result, ShadowError, TracerConfig};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Parse filter directives without consulting `RUST_LOG`.
pub fn env_filter(directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directives).map_err(|err| {
        ShadowError::Configuration(format!("invalid log filter '{}': {}", directives, err))
    })
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `config.log_filter` when it is set and valid.
/// Fails if a global subscriber is already installed.
pub fn init_tracing(config: &TracerConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => env_filter(&config.log_filter)?,
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .try_init()
        .map_err(|err| ShadowError::Configuration(format!("tracing already initialized: {}", err)))?;
    tracing::debug!(log_filter = %config.log_filter, "Tracing initialized");
    Ok(())
}
