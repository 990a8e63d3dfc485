use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use groups_api::{
    app::{create_app, AppState},
    config::Config,
    jobs::{AuthmanSyncJob, JobScheduler, PoolMetricsJob},
    middleware::{init_metrics, logging::init_logging},
    services::Collaborators,
};
use persistence::PgGroupStore;

/// Upper bound for draining background work on shutdown.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let config = Config::load()?;

    init_logging(&config.logging)?;
    init_metrics().context("Failed to install Prometheus recorder")?;

    info!("Starting groups API v{}", env!("CARGO_PKG_VERSION"));

    let pool = persistence::db::create_pool(&(&config.database).into()).await?;

    info!("Running database migrations...");
    persistence::db::run_migrations(&pool).await?;
    info!("Migrations completed");

    let collaborators = Collaborators::from_config(&config)?;
    let store = Arc::new(PgGroupStore::new(pool.clone()));
    let state = AppState::new(
        config.clone(),
        store,
        collaborators.roster,
        collaborators.accounts,
        collaborators.dispatcher,
    )?;

    let mut scheduler = JobScheduler::new();
    scheduler.register(PoolMetricsJob::new(pool));
    if config.authman.enabled {
        scheduler.register(AuthmanSyncJob::new(
            state.reconciler.clone(),
            config.authman.sync_interval_minutes,
        ));
    } else {
        info!("Directory synchronization disabled");
    }
    scheduler.start();

    let outbox = state.outbox.clone();
    let app = create_app(state);

    let addr = config.socket_addr()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    scheduler.wait_for_shutdown(SHUTDOWN_TIMEOUT).await;

    if tokio::time::timeout(SHUTDOWN_TIMEOUT, outbox.flush())
        .await
        .is_err()
    {
        warn!("Timed out delivering queued notifications");
    }

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
