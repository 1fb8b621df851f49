use std::sync::Arc;

use axum::routing::get;
use metrics_exporter_prometheus::PrometheusBuilder;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use meshgen::app_state::AppState;
use meshgen::config::AppConfig;
use meshgen::db;
use meshgen::routes;
use meshgen::services::{queue::DispatchQueue, storage::S3BlobStore};
use meshgen::store::PgJobStore;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing meshgen API server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    // Register application metrics
    metrics::describe_counter!(
        "generation_jobs_submitted_total",
        "Total generation jobs submitted"
    );
    metrics::describe_counter!(
        "generation_jobs_completed_total",
        "Total generation jobs completed"
    );
    metrics::describe_counter!(
        "generation_jobs_failed_total",
        "Total generation jobs that failed"
    );
    metrics::describe_gauge!(
        "generation_queue_depth",
        "Current number of pending jobs in the dispatch queue"
    );
    metrics::describe_histogram!(
        "pipeline_processing_seconds",
        "Time to run the full generation pipeline for one job"
    );
    metrics::describe_histogram!(
        "pipeline_stage_seconds",
        "Time spent in one pipeline stage"
    );

    // Initialize database connection pool
    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run database migrations
    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    // Initialize object storage client
    tracing::info!("Initializing S3 blob store");
    let blobs = S3BlobStore::new(&config).expect("Failed to initialize blob store");

    // Initialize Redis dispatch queue
    tracing::info!("Connecting to Redis dispatch queue");
    let queue = DispatchQueue::new(&config.redis_url).expect("Failed to initialize dispatch queue");

    // Create shared application state
    let state = AppState::new(
        Arc::new(PgJobStore::new(db_pool)),
        Arc::new(blobs),
        Arc::new(queue),
        config.presign_ttl_secs,
    );

    // Build API routes
    let app = routes::router(state)
        // Prometheus metrics endpoint (separate state)
        .route(
            "/metrics",
            get(routes::metrics::prometheus_metrics).with_state(prometheus_handle),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(20 * 1024 * 1024)); // 20 MB upload limit

    tracing::info!("Starting meshgen on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
