use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "WEALTHDESK_LOG";

/// Logs go to stderr so stdout stays machine-readable.
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
