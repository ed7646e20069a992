use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "FORKGATE_LOG";

/// Installs the global fmt subscriber. `FORKGATE_LOG` takes precedence over
/// `RUST_LOG`; with neither set, `verbose` picks between debug and info.
pub fn init(verbose: bool) -> Result<(), String> {
    let level = if verbose { "forkgate=debug" } else { "forkgate=info" };
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .map_err(|e| format!("failed to initialize tracing subscriber: {e}"))
}
