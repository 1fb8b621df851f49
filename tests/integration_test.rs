//! Integration test: full generation flow against real backing services.
//!
//! This test verifies the complete integration:
//! 1. Database connection, migrations, and job persistence
//! 2. S3-compatible storage (bucket creation, upload, download, presign)
//! 3. Redis dispatch queue (submit/claim/ack)
//! 4. Orchestrator execution end to end
//!
//! Note: this requires running PostgreSQL, Redis, and MinIO instances
//! configured via environment variables.

use std::sync::Arc;

use uuid::Uuid;

use meshgen::config::AppConfig;
use meshgen::db;
use meshgen::models::job::{JobStatus, NewJob};
use meshgen::pipeline::{ExecuteOutcome, Orchestrator, SyntheticEngine};
use meshgen::services::queue::{DispatchQueue, Dispatcher};
use meshgen::services::storage::{BlobStore, BucketKind, S3BlobStore};
use meshgen::store::{JobStore, PgJobStore};

#[tokio::test]
#[ignore] // Run with: cargo test --test integration_test -- --ignored
async fn test_full_integration() {
    // Load config from environment
    let config = AppConfig::from_env().expect("Failed to load config");

    // Initialize database
    let db_pool = db::init_pool(&config.database_url)
        .await
        .expect("Failed to connect to database");

    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run migrations");

    let store = Arc::new(PgJobStore::new(db_pool));

    // Initialize blob store and make sure both buckets exist
    let blobs = Arc::new(S3BlobStore::new(&config).expect("Failed to initialize blob store"));
    blobs
        .ensure_buckets()
        .await
        .expect("Failed to ensure buckets");

    let queue = DispatchQueue::new(&config.redis_url).expect("Failed to initialize queue");

    // 1. Store an input image
    let input_key = format!("test/{}.png", Uuid::new_v4());
    let input_bytes = test_png();
    blobs
        .put(BucketKind::Uploads, &input_key, &input_bytes, "image/png")
        .await
        .expect("Input upload failed");

    // 2. Create the job record
    let job = store
        .create(NewJob {
            owner: "integration-test".to_string(),
            input_key: input_key.clone(),
            input_filename: Some("test.png".to_string()),
            mode: "fast".to_string(),
            target_format: "glb".to_string(),
            max_polygons: Some(10_000),
        })
        .await
        .expect("Failed to create job");

    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.progress, 0.0);

    // 3. Dispatch and claim, as the gateway and a worker slot would
    queue.submit(job.id).await.expect("Failed to submit");

    let delivery = queue
        .next()
        .await
        .expect("Failed to claim delivery")
        .expect("No delivery in queue");
    assert_eq!(delivery.job_id, job.id);

    // 4. Execute the pipeline
    let orchestrator = Orchestrator::new(store.clone(), blobs.clone(), Arc::new(SyntheticEngine));
    let outcome = orchestrator
        .execute(delivery.job_id)
        .await
        .expect("Execution could not persist state");
    assert_eq!(outcome, ExecuteOutcome::Completed);

    queue.ack(&delivery).await.expect("Failed to ack delivery");

    // 5. Verify the committed terminal state
    let finished = store
        .load(job.id)
        .await
        .expect("Failed to load job")
        .expect("Job not found");
    assert_eq!(finished.status, JobStatus::Completed);
    assert_eq!(finished.progress, 1.0);

    let artifacts = store.artifacts(job.id).await.expect("Failed to list artifacts");
    assert!(!artifacts.is_empty());
    assert!(artifacts.iter().any(|a| a.kind == "glb"));

    // 6. Every artifact must be downloadable via a presigned URL
    for artifact in &artifacts {
        let url = blobs
            .presign_get(BucketKind::Artifacts, &artifact.key, config.presign_ttl_secs)
            .await
            .expect("Presign failed");
        assert!(url.contains(&artifact.key));
    }

    // 7. Redelivery of the finished job must no-op
    queue.submit(job.id).await.expect("Failed to resubmit");
    let redelivery = queue
        .next()
        .await
        .expect("Failed to claim redelivery")
        .expect("No redelivery in queue");
    let outcome = orchestrator
        .execute(redelivery.job_id)
        .await
        .expect("Redelivery execution failed");
    assert_eq!(outcome, ExecuteOutcome::AlreadyTerminal);
    queue.ack(&redelivery).await.expect("Failed to ack redelivery");

    println!("✅ All integration tests passed!");
}

fn test_png() -> Vec<u8> {
    use std::io::Cursor;

    let img = image::ImageBuffer::from_pixel(4, 4, image::Rgb([90u8, 120u8, 200u8]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("failed to encode test PNG");
    buf
}
