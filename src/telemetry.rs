//! Tracing subscriber initialisation.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter applied when `RUST_LOG` is unset or invalid.
pub const DEFAULT_FILTER: &str = "info";

/// Error returned when a global subscriber is already installed.
#[derive(Debug, thiserror::Error)]
#[error("failed to install tracing subscriber: {0}")]
pub struct TelemetryError(#[from] tracing_subscriber::util::TryInitError);

/// Installs a global subscriber writing formatted events to stderr.
///
/// The filter comes from `RUST_LOG`, falling back to [`DEFAULT_FILTER`].
///
/// # Errors
///
/// Returns [`TelemetryError`] when a global subscriber already exists.
pub fn init_tracing() -> Result<(), TelemetryError> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .try_init()?;
    Ok(())
}
