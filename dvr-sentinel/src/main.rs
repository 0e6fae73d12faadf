use anyhow::Context;
use tokio_util::sync::CancellationToken;
use dvr_sentinel::config::AppConfig;
use dvr_sentinel::services::ServiceContainer;
use dvr_sentinel::{database, logging, panic_hook};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = AppConfig::load().context("invalid configuration")?;

    let (logging_config, _log_guard) =
        logging::init_logging(&config.log_dir).context("failed to initialize logging")?;
    panic_hook::install(logging_config.log_dir());
    let log_cleanup = CancellationToken::new();
    logging_config.start_retention_cleanup(log_cleanup.clone());

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "dvr-sentinel starting");
    config.log_summary();

    // Initialize database
    let pool = database::init_pool(&config.database_url).await?;
    database::run_migrations(&pool).await?;

    let container = ServiceContainer::new(pool, &config)?;
    container.start().await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received");

    container.shutdown().await?;
    log_cleanup.cancel();
    Ok(())
}
