use anyhow::Result;
use clap::Parser;
use diesel::{Connection, PgConnection};
use diesel_migrations::MigrationHarness;
use std::sync::Arc;
use tracing::info;

use inventory_service::api::{self, AppState};
use inventory_service::{BatchProcessor, Config, PgStore, TransferEngine, MIGRATIONS};

fn run_migrations(database_url: &str) -> Result<()> {
    let mut conn = PgConnection::establish(database_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("Migration error: {}", e))?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let config = Config::parse();

    if config.skip_migrations {
        info!("Skipping database migrations");
    } else {
        info!("Running database migrations...");
        let url = config.database_url.clone();
        tokio::task::spawn_blocking(move || run_migrations(&url)).await??;
        info!("Migrations completed successfully");
    }

    let store = PgStore::connect(&config.database_url, config.pool_size, config.connect_timeout()).await?;
    let engine = Arc::new(TransferEngine::new(Arc::new(store)));
    let batch = Arc::new(BatchProcessor::new(
        engine.clone(),
        config.batch_max_size,
        config.batch_concurrency,
    ));

    let app = api::create_router(AppState { engine, batch });
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;

    info!(
        port = config.port,
        batch_max_size = config.batch_max_size,
        batch_concurrency = config.batch_concurrency,
        "Inventory service ready to accept HTTP requests"
    );

    axum::serve(listener, app).await?;

    Ok(())
}
