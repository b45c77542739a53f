use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber. `RUST_LOG` overrides the default `info`.
/// Calling it twice is harmless.
pub fn init() {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  let installed = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_target(false)
    .compact()
    .try_init()
    .is_ok();

  if installed {
    tracing::info!(service = env!("CARGO_PKG_NAME"), "logging initialized");
  }
}
