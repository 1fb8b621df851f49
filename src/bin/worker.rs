use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use meshgen::config::AppConfig;
use meshgen::db;
use meshgen::pipeline::{Orchestrator, SyntheticEngine};
use meshgen::services::{queue::DispatchQueue, storage::S3BlobStore};
use meshgen::store::PgJobStore;
use meshgen::worker;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting meshgen pipeline worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // Initialize database
    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Initialize services
    tracing::info!("Initializing services");
    let blobs = S3BlobStore::new(&config).expect("Failed to initialize blob store");

    let queue = Arc::new(
        DispatchQueue::new(&config.redis_url).expect("Failed to initialize dispatch queue"),
    );

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::new(PgJobStore::new(db_pool)),
        Arc::new(blobs),
        Arc::new(SyntheticEngine),
    ));

    // Graceful shutdown on SIGINT: finish in-flight executions, claim no
    // new deliveries.
    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    worker::run_pool(queue, orchestrator, config.worker_slots, shutdown).await;
}
