use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// The environment variable holding the log filter directives, e.g. `debug` or
/// `envoy_dynamic_modules_v1_sdk=trace`.
pub const LOG_ENV: &str = "ENVOY_DYNAMIC_MODULE_LOG";

const DEFAULT_DIRECTIVE: &str = "info";

/// Installs the global `tracing` subscriber writing to stderr.
///
/// This is called from the program init event. If the module or the process has already
/// installed a global subscriber, that one is kept and this is a no-op.
pub fn init() {
  let filter =
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

  let result = tracing_subscriber::registry()
    .with(filter)
    .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
    .try_init();
  if result.is_ok() {
    tracing::debug!("logging initialized");
  }
}
