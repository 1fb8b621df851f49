use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db::queries;
use crate::models::artifact::{Artifact, NewArtifact};
use crate::models::job::{Job, JobStatus, NewJob};
use crate::models::job_log::LogLevel;
use crate::pipeline::stage::Stage;
use crate::store::{JobStore, StoreError};

/// PostgreSQL-backed job store. Atomicity comes from single-statement
/// updates (`save_progress`) and an explicit transaction around artifact
/// insertion plus the completion status flip.
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn create(&self, new: NewJob) -> Result<Job, StoreError> {
        Ok(queries::create_job(&self.pool, &new).await?)
    }

    async fn load(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(queries::get_job(&self.pool, job_id).await?)
    }

    async fn load_owned(&self, job_id: Uuid, owner: &str) -> Result<Option<Job>, StoreError> {
        Ok(queries::get_job_owned(&self.pool, job_id, owner).await?)
    }

    async fn save_progress(
        &self,
        job_id: Uuid,
        stage: Option<Stage>,
        progress: f64,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        let updated =
            queries::save_progress(&self.pool, job_id, stage, progress, status, error).await?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn save_artifacts(
        &self,
        job_id: Uuid,
        artifacts: &[NewArtifact],
    ) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(StoreError::Database)?;
        queries::insert_artifacts(&mut *conn, job_id, artifacts).await?;
        Ok(())
    }

    async fn complete_with_artifacts(
        &self,
        job_id: Uuid,
        artifacts: &[NewArtifact],
    ) -> Result<(), StoreError> {
        let updated = queries::complete_with_artifacts(&self.pool, job_id, artifacts).await?;
        if updated == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn artifacts(&self, job_id: Uuid) -> Result<Vec<Artifact>, StoreError> {
        Ok(queries::list_artifacts(&self.pool, job_id).await?)
    }

    async fn append_log(
        &self,
        job_id: Uuid,
        level: LogLevel,
        message: &str,
    ) -> Result<(), StoreError> {
        Ok(queries::append_log(&self.pool, job_id, level, message).await?)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(StoreError::Database)?;
        Ok(())
    }
}
