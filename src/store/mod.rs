//! Durable job state: the contract the orchestrator and API consume, with a
//! PostgreSQL implementation for production and an in-memory implementation
//! for tests and local development.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::artifact::{Artifact, NewArtifact};
use crate::models::job::{Job, JobStatus, NewJob};
use crate::models::job_log::LogLevel;
use crate::pipeline::stage::Stage;

pub mod memory;
pub mod postgres;

pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;

/// Durable record of job identity, status, stage, progress, error, and
/// associated artifacts and log entries.
///
/// Atomicity guarantees the orchestrator relies on:
/// - `save_progress` commits stage, progress, status, and error in one
///   mutation; a concurrent reader never observes a stage that does not
///   correspond to the persisted progress.
/// - `complete_with_artifacts` inserts the artifact records and flips the
///   job to `completed` / progress `1.0` in a single transaction; `completed`
///   is never observable without the artifacts being queryable.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn create(&self, new: NewJob) -> Result<Job, StoreError>;

    async fn load(&self, job_id: Uuid) -> Result<Option<Job>, StoreError>;

    /// Owner-scoped lookup for the client-facing query surface.
    async fn load_owned(&self, job_id: Uuid, owner: &str) -> Result<Option<Job>, StoreError>;

    async fn save_progress(
        &self,
        job_id: Uuid,
        stage: Option<Stage>,
        progress: f64,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError>;

    async fn save_artifacts(&self, job_id: Uuid, artifacts: &[NewArtifact])
        -> Result<(), StoreError>;

    async fn complete_with_artifacts(
        &self,
        job_id: Uuid,
        artifacts: &[NewArtifact],
    ) -> Result<(), StoreError>;

    async fn artifacts(&self, job_id: Uuid) -> Result<Vec<Artifact>, StoreError>;

    async fn append_log(
        &self,
        job_id: Uuid,
        level: LogLevel,
        message: &str,
    ) -> Result<(), StoreError>;

    /// Connectivity probe for health checks.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("job not found")]
    NotFound,

    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
