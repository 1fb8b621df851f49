use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{Job, JobStatus};
use crate::pipeline::stage::Stage;

/// Snapshot of a job returned to clients.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobResponse {
    pub id: Uuid,
    pub status: JobStatus,
    pub stage: Option<Stage>,
    pub progress: f64,
    pub error: Option<String>,
    pub mode: String,
    pub target_format: String,
    pub max_polygons: Option<i32>,
    pub input_filename: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Job> for JobResponse {
    fn from(job: Job) -> Self {
        Self {
            id: job.id,
            status: job.status,
            stage: job.stage,
            progress: job.progress,
            error: job.error,
            mode: job.mode,
            target_format: job.target_format,
            max_polygons: job.max_polygons,
            input_filename: job.input_filename,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// Download manifest for a completed job: one presigned URL per artifact kind.
#[derive(Debug, Serialize, Deserialize)]
pub struct DownloadResponse {
    pub job_id: Uuid,
    pub downloads: BTreeMap<String, String>,
}
