use workout_sync_lib::config::AppConfig;
use workout_sync_lib::logging;

#[tokio::main]
async fn main() {
  logging::init();

  let config = match AppConfig::from_env() {
    Ok(config) => config,
    Err(e) => {
      tracing::error!(error = %e, "failed to load configuration");
      std::process::exit(1);
    }
  };

  let app = match workout_sync_lib::run(config).await {
    Ok(app) => app,
    Err(e) => {
      tracing::error!(error = %e, "failed to start");
      std::process::exit(1);
    }
  };

  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(error = %e, "failed to listen for shutdown signal");
  }
  app.shutdown().await;
}
