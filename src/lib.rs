pub mod api;
pub mod config;
pub mod core_state;
pub mod db;
pub mod maintenance;
pub mod models;
pub mod monitoring;

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Errors that stop the service from starting.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Core(#[from] core_state::CoreError),
    #[error(transparent)]
    Server(#[from] api::ServerError),
    #[error("Signal handler failed: {0}")]
    Signal(std::io::Error),
}

/// Run the service until Ctrl-C.
pub async fn run() -> Result<(), StartupError> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .init();

    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let config = config::MonitorConfig::from_env()?;
    let db = core_state::Database::open(&config.db_path)?;
    let bind_addr = config.bind_addr.to_string();
    let interval = config.maintenance_interval;
    let core = Arc::new(core_state::CoreState::new(config, db)?);

    let maintenance = maintenance::start_maintenance(core.coordinator.clone(), interval);
    let mut server = api::start_server(core.clone(), &bind_addr).await?;
    tracing::info!(addr = %server.addr, "Accepting device samples");

    let signal = tokio::signal::ctrl_c().await;
    tracing::info!("Shutting down");
    server.shutdown();
    maintenance.shutdown();
    drop(maintenance);

    signal.map_err(StartupError::Signal)
}
