//! Shared helpers for integration tests: in-memory backends plus a
//! scriptable stage engine for fault injection.

#![allow(dead_code)]

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use image::{ImageBuffer, ImageFormat, Rgb};
use uuid::Uuid;

use meshgen::models::job::{Job, NewJob};
use meshgen::pipeline::context::{PipelineContext, StageOutput};
use meshgen::pipeline::{Stage, StageEngine, StageError, SyntheticEngine};
use meshgen::services::storage::{BlobStore, BucketKind, MemoryBlobStore};
use meshgen::store::{JobStore, MemoryJobStore};

/// A tiny but well-formed PNG for upload fixtures.
pub fn png_bytes() -> Vec<u8> {
    let img = ImageBuffer::from_pixel(4, 4, Rgb([200u8, 100u8, 50u8]));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("failed to encode fixture PNG");
    buf
}

/// Synthetic engine wrapper that can fail at a chosen stage and slow stages
/// down to force execution overlap in concurrency tests.
pub struct ScriptedEngine {
    inner: SyntheticEngine,
    fail_at: Option<Stage>,
    stage_delay: Option<Duration>,
}

impl ScriptedEngine {
    pub fn new() -> Self {
        Self {
            inner: SyntheticEngine,
            fail_at: None,
            stage_delay: None,
        }
    }

    pub fn failing_at(stage: Stage) -> Self {
        Self {
            fail_at: Some(stage),
            ..Self::new()
        }
    }

    pub fn with_stage_delay(delay: Duration) -> Self {
        Self {
            stage_delay: Some(delay),
            ..Self::new()
        }
    }
}

#[async_trait]
impl StageEngine for ScriptedEngine {
    async fn run(&self, stage: Stage, ctx: &PipelineContext) -> Result<StageOutput, StageError> {
        if let Some(delay) = self.stage_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_at == Some(stage) {
            return Err(StageError::fatal(format!("{stage} stage failed: synthetic fault")));
        }
        self.inner.run(stage, ctx).await
    }
}

/// Create a queued job with its input image already present in the uploads
/// bucket, ready for the orchestrator.
pub async fn seed_job(store: &MemoryJobStore, blobs: &MemoryBlobStore, target_format: &str) -> Job {
    let input_key = format!("{}.png", Uuid::new_v4());
    blobs
        .put(BucketKind::Uploads, &input_key, &png_bytes(), "image/png")
        .await
        .expect("failed to seed input blob");

    store
        .create(NewJob {
            owner: "tester".to_string(),
            input_key,
            input_filename: Some("subject.png".to_string()),
            mode: "high_quality".to_string(),
            target_format: target_format.to_string(),
            max_polygons: None,
        })
        .await
        .expect("failed to seed job")
}
