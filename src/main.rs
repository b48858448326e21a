use std::sync::Arc;

use anyhow::Result;

use portal::auth::{LinkedInStrategy, StrategyRegistry};
use portal::config::{self, Config, Environment};
use portal::logging;
use portal::server::{self, AppState};
use portal::users::JsonUserRepository;

#[tokio::main]
async fn main() -> Result<()> {
    // Ensure config directory exists (default users.json lives there)
    config::ensure_directories()?;

    let env = Environment::from_env();
    let config = Config::load()?;

    // Initialize logging BEFORE any tracing calls
    let (log_file_info, _guard) = logging::init_logging(&config.log, env)?;

    tracing::info!(environment = env.as_str(), "Starting {}", config.app.title);
    if let Some(info) = &log_file_info {
        tracing::info!("Logging to: {}", info.path.display());
    }

    let users = JsonUserRepository::load_from(&config.users.store_path())?;

    let mut strategies = StrategyRegistry::new();
    match LinkedInStrategy::new(&config.linkedin) {
        Ok(linkedin) => strategies.register(Arc::new(linkedin)),
        Err(e) => tracing::warn!("{}, LinkedIn sign-in disabled", e),
    }
    if strategies.is_empty() {
        tracing::warn!("No sign-in strategies configured");
    } else {
        tracing::info!(strategies = ?strategies.names(), "Sign-in strategies registered");
    }

    let state = AppState::new(strategies, Arc::new(users));
    let app = server::router(state, logging::request_log_options(&config.log, env));
    let handle = server::start(&config.server.host, config.server.port, app).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received Ctrl+C");
    handle.shutdown().await
}
