use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::artifact::NewArtifact;
use crate::models::job::JobStatus;
use crate::models::job_log::LogLevel;
use crate::pipeline::context::{ArtifactDraft, PipelineContext, StageOutput};
use crate::pipeline::engine::StageEngine;
use crate::pipeline::stage::Stage;
use crate::services::storage::{BlobStore, BucketKind};
use crate::store::{JobStore, StoreError};

/// Result of one `execute` invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteOutcome {
    /// All stages succeeded and artifacts were committed.
    Completed,
    /// A stage or storage call failed; the job was marked failed.
    Failed,
    /// The job was already in a terminal state; nothing was mutated.
    AlreadyTerminal,
    /// Another execution currently holds the per-job lock.
    InFlight,
    /// No job record exists for the id.
    NotFound,
}

/// The single unrecoverable condition: job state could not be persisted,
/// not even the failure record. The delivery must be left unacknowledged so
/// the dispatcher redelivers and the whole execution is retried.
#[derive(Debug, thiserror::Error)]
pub enum ExecuteError {
    #[error("job state could not be persisted: {0}")]
    Store(#[from] StoreError),
}

/// Per-process advisory locks preventing two concurrent executions of the
/// same job id. The guard releases on drop, so the lock is freed on every
/// exit path, including panics inside a stage.
#[derive(Default)]
pub struct JobLocks {
    held: Mutex<HashSet<Uuid>>,
}

impl JobLocks {
    fn try_acquire(self: &Arc<Self>, job_id: Uuid) -> Option<JobLockGuard> {
        let mut held = self.held.lock();
        if held.insert(job_id) {
            Some(JobLockGuard {
                locks: Arc::clone(self),
                job_id,
            })
        } else {
            None
        }
    }
}

struct JobLockGuard {
    locks: Arc<JobLocks>,
    job_id: Uuid,
}

impl Drop for JobLockGuard {
    fn drop(&mut self) {
        self.locks.held.lock().remove(&self.job_id);
    }
}

/// Drives a job through the ordered pipeline stages, persisting progress
/// after each stage success and finalizing into `completed` or `failed`.
pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    blobs: Arc<dyn BlobStore>,
    engine: Arc<dyn StageEngine>,
    locks: Arc<JobLocks>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
        engine: Arc<dyn StageEngine>,
    ) -> Self {
        Self {
            store,
            blobs,
            engine,
            locks: Arc::new(JobLocks::default()),
        }
    }

    /// Execute the pipeline for one job.
    ///
    /// Idempotent on terminal states: re-invocation on a `completed` or
    /// `failed` job performs no work and no mutation, so spurious redelivery
    /// never duplicates artifacts. Progress is advanced only on stage
    /// success; a crash mid-stage leaves `stage` pointing at the last
    /// completed stage. No stage or storage error escapes; the only `Err`
    /// is the case where even the failure record could not be persisted.
    pub async fn execute(&self, job_id: Uuid) -> Result<ExecuteOutcome, ExecuteError> {
        let Some(_guard) = self.locks.try_acquire(job_id) else {
            tracing::debug!(job_id = %job_id, "execution already in flight, skipping");
            return Ok(ExecuteOutcome::InFlight);
        };

        let Some(job) = self.store.load(job_id).await? else {
            tracing::warn!(job_id = %job_id, "job not found, dropping delivery");
            return Ok(ExecuteOutcome::NotFound);
        };

        if job.status.is_terminal() {
            tracing::debug!(job_id = %job_id, status = %job.status, "job already terminal, no-op");
            return Ok(ExecuteOutcome::AlreadyTerminal);
        }

        tracing::info!(job_id = %job_id, mode = %job.mode, target_format = %job.target_format, "starting pipeline");
        let started = Instant::now();

        // queued -> running. A redelivered job that crashed mid-run restarts
        // the whole pipeline from preprocess; observers may see progress
        // reset across the redelivery boundary.
        if let Err(e) = self
            .store
            .save_progress(job_id, job.stage, job.progress, JobStatus::Running, None)
            .await
        {
            return self
                .fail(job_id, job.stage, job.progress, &format!("state persistence failed: {e}"))
                .await;
        }
        let mut last_progress = job.progress;

        let input_image = match self.blobs.get(BucketKind::Uploads, &job.input_key).await {
            Ok(bytes) => bytes,
            Err(e) => {
                return self
                    .fail(job_id, job.stage, last_progress, &format!("input fetch failed: {e}"))
                    .await;
            }
        };

        let mut ctx = PipelineContext::new(&job, input_image);
        let mut drafts: Vec<ArtifactDraft> = Vec::new();

        for &stage in Stage::all() {
            let stage_started = Instant::now();

            match self.engine.run(stage, &ctx).await {
                Ok(output) => {
                    if let StageOutput::Export(export) = output {
                        drafts = export.artifacts;
                    } else {
                        ctx.apply(output);
                    }

                    let target = stage.progress_target();
                    if let Err(e) = self
                        .store
                        .save_progress(job_id, Some(stage), target, JobStatus::Running, None)
                        .await
                    {
                        return self
                            .fail(
                                job_id,
                                Some(stage),
                                last_progress,
                                &format!("progress persistence failed: {e}"),
                            )
                            .await;
                    }
                    last_progress = target;

                    metrics::histogram!("pipeline_stage_seconds", "stage" => stage.to_string())
                        .record(stage_started.elapsed().as_secs_f64());
                    self.log(job_id, LogLevel::Info, &format!("stage {stage} completed"))
                        .await;
                    tracing::debug!(job_id = %job_id, stage = %stage, progress = target, "stage completed");
                }
                Err(err) => {
                    return self.fail(job_id, Some(stage), last_progress, &err.message).await;
                }
            }
        }

        // Upload artifact blobs, then commit the records together with the
        // status flip so `completed` is never observable without them.
        for draft in &drafts {
            if let Err(e) = self
                .blobs
                .put(BucketKind::Artifacts, &draft.key, &draft.bytes, &draft.content_type)
                .await
            {
                return self
                    .fail(
                        job_id,
                        Some(Stage::Export),
                        last_progress,
                        &format!("artifact upload failed: {e}"),
                    )
                    .await;
            }
        }

        let records: Vec<NewArtifact> = drafts.iter().map(ArtifactDraft::record).collect();
        if let Err(e) = self.store.complete_with_artifacts(job_id, &records).await {
            return self
                .fail(
                    job_id,
                    Some(Stage::Export),
                    last_progress,
                    &format!("completion commit failed: {e}"),
                )
                .await;
        }

        self.log(job_id, LogLevel::Info, "pipeline completed").await;
        metrics::counter!("generation_jobs_completed_total").increment(1);
        metrics::histogram!("pipeline_processing_seconds").record(started.elapsed().as_secs_f64());
        tracing::info!(
            job_id = %job_id,
            artifacts = records.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "pipeline completed"
        );

        Ok(ExecuteOutcome::Completed)
    }

    /// Record a failure: freeze progress at the last persisted value with the
    /// failing stage name. If even this cannot be persisted, surface the
    /// store error so the delivery stays unacknowledged.
    async fn fail(
        &self,
        job_id: Uuid,
        stage: Option<Stage>,
        progress: f64,
        message: &str,
    ) -> Result<ExecuteOutcome, ExecuteError> {
        tracing::warn!(
            job_id = %job_id,
            stage = ?stage,
            error = %message,
            "pipeline failed"
        );

        self.store
            .save_progress(job_id, stage, progress, JobStatus::Failed, Some(message))
            .await?;

        self.log(job_id, LogLevel::Error, message).await;
        metrics::counter!("generation_jobs_failed_total").increment(1);

        Ok(ExecuteOutcome::Failed)
    }

    /// Best-effort diagnostic log entry; a log write failure never changes
    /// the outcome of the execution.
    async fn log(&self, job_id: Uuid, level: LogLevel, message: &str) {
        if let Err(e) = self.store.append_log(job_id, level, message).await {
            tracing::warn!(job_id = %job_id, error = %e, "failed to append job log entry");
        }
    }
}
