use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use uuid::Uuid;

use crate::models::artifact::{Artifact, NewArtifact};
use crate::models::job::{Job, JobStatus, NewJob};
use crate::models::job_log::{JobLog, LogLevel};
use crate::pipeline::stage::Stage;
use crate::store::{JobStore, StoreError};

/// One persisted `(stage, progress, status)` observation, recorded in commit
/// order. Tests assert orchestration properties against this history.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressSample {
    pub stage: Option<Stage>,
    pub progress: f64,
    pub status: JobStatus,
    pub error: Option<String>,
}

#[derive(Default)]
struct State {
    jobs: HashMap<Uuid, Job>,
    artifacts: HashMap<Uuid, Vec<Artifact>>,
    logs: HashMap<Uuid, Vec<JobLog>>,
    history: HashMap<Uuid, Vec<ProgressSample>>,
    next_artifact_id: i64,
    next_log_id: i64,
}

/// In-memory job store for tests and local development.
///
/// All mutations happen under one lock, giving the same atomicity the
/// PostgreSQL implementation gets from single-statement updates and
/// transactions: readers always see a consistent `(stage, progress, status)`
/// triple, and `completed` is never visible without its artifacts.
#[derive(Default)]
pub struct MemoryJobStore {
    state: Mutex<State>,
    fail_persistence: AtomicBool,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persisted progress observations for a job, in commit order.
    pub fn history(&self, job_id: Uuid) -> Vec<ProgressSample> {
        self.state
            .lock()
            .history
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn logs(&self, job_id: Uuid) -> Vec<JobLog> {
        self.state
            .lock()
            .logs
            .get(&job_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn job_count(&self) -> usize {
        self.state.lock().jobs.len()
    }

    /// Make subsequent progress/completion writes fail, simulating a store
    /// outage during execution.
    pub fn set_fail_persistence(&self, fail: bool) {
        self.fail_persistence.store(fail, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.fail_persistence.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("injected store outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, new: NewJob) -> Result<Job, StoreError> {
        let now = Utc::now();
        let job = Job {
            id: Uuid::new_v4(),
            owner: new.owner,
            input_key: new.input_key,
            input_filename: new.input_filename,
            mode: new.mode,
            target_format: new.target_format,
            max_polygons: new.max_polygons,
            status: JobStatus::Queued,
            stage: None,
            progress: 0.0,
            error: None,
            created_at: now,
            updated_at: now,
        };

        self.state.lock().jobs.insert(job.id, job.clone());
        Ok(job)
    }

    async fn load(&self, job_id: Uuid) -> Result<Option<Job>, StoreError> {
        Ok(self.state.lock().jobs.get(&job_id).cloned())
    }

    async fn load_owned(&self, job_id: Uuid, owner: &str) -> Result<Option<Job>, StoreError> {
        Ok(self
            .state
            .lock()
            .jobs
            .get(&job_id)
            .filter(|job| job.owner == owner)
            .cloned())
    }

    async fn save_progress(
        &self,
        job_id: Uuid,
        stage: Option<Stage>,
        progress: f64,
        status: JobStatus,
        error: Option<&str>,
    ) -> Result<(), StoreError> {
        self.check_available()?;

        let mut state = self.state.lock();
        let job = state.jobs.get_mut(&job_id).ok_or(StoreError::NotFound)?;

        job.stage = stage;
        job.progress = progress;
        job.status = status;
        job.error = error.map(str::to_string);
        job.updated_at = Utc::now();

        state.history.entry(job_id).or_default().push(ProgressSample {
            stage,
            progress,
            status,
            error: error.map(str::to_string),
        });
        Ok(())
    }

    async fn save_artifacts(
        &self,
        job_id: Uuid,
        artifacts: &[NewArtifact],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if !state.jobs.contains_key(&job_id) {
            return Err(StoreError::NotFound);
        }

        let now = Utc::now();
        for artifact in artifacts {
            state.next_artifact_id += 1;
            let id = state.next_artifact_id;
            state.artifacts.entry(job_id).or_default().push(Artifact {
                id,
                job_id,
                key: artifact.key.clone(),
                kind: artifact.kind.clone(),
                created_at: now,
            });
        }
        Ok(())
    }

    async fn complete_with_artifacts(
        &self,
        job_id: Uuid,
        artifacts: &[NewArtifact],
    ) -> Result<(), StoreError> {
        self.check_available()?;

        let mut state = self.state.lock();
        if !state.jobs.contains_key(&job_id) {
            return Err(StoreError::NotFound);
        }

        let now = Utc::now();
        for artifact in artifacts {
            state.next_artifact_id += 1;
            let id = state.next_artifact_id;
            state.artifacts.entry(job_id).or_default().push(Artifact {
                id,
                job_id,
                key: artifact.key.clone(),
                kind: artifact.kind.clone(),
                created_at: now,
            });
        }

        let job = state.jobs.get_mut(&job_id).ok_or(StoreError::NotFound)?;
        job.status = JobStatus::Completed;
        job.progress = 1.0;
        job.error = None;
        job.updated_at = now;
        let stage = job.stage;

        state.history.entry(job_id).or_default().push(ProgressSample {
            stage,
            progress: 1.0,
            status: JobStatus::Completed,
            error: None,
        });
        Ok(())
    }

    async fn artifacts(&self, job_id: Uuid) -> Result<Vec<Artifact>, StoreError> {
        Ok(self
            .state
            .lock()
            .artifacts
            .get(&job_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn append_log(
        &self,
        job_id: Uuid,
        level: LogLevel,
        message: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        if !state.jobs.contains_key(&job_id) {
            return Err(StoreError::NotFound);
        }

        state.next_log_id += 1;
        let id = state.next_log_id;
        state.logs.entry(job_id).or_default().push(JobLog {
            id,
            job_id,
            level,
            message: message.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_job(owner: &str) -> NewJob {
        NewJob {
            owner: owner.to_string(),
            input_key: "input.png".to_string(),
            input_filename: Some("cat.png".to_string()),
            mode: "high_quality".to_string(),
            target_format: "glb".to_string(),
            max_polygons: None,
        }
    }

    #[tokio::test]
    async fn test_create_and_load() {
        let store = MemoryJobStore::new();
        let job = store.create(new_job("alice")).await.unwrap();

        let loaded = store.load(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Queued);
        assert_eq!(loaded.progress, 0.0);
        assert!(loaded.stage.is_none());
    }

    #[tokio::test]
    async fn test_owner_scoping() {
        let store = MemoryJobStore::new();
        let job = store.create(new_job("alice")).await.unwrap();

        assert!(store.load_owned(job.id, "alice").await.unwrap().is_some());
        assert!(store.load_owned(job.id, "mallory").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_progress_records_history() {
        let store = MemoryJobStore::new();
        let job = store.create(new_job("alice")).await.unwrap();

        store
            .save_progress(job.id, Some(Stage::Preprocess), 0.05, JobStatus::Running, None)
            .await
            .unwrap();

        let loaded = store.load(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.stage, Some(Stage::Preprocess));
        assert_eq!(loaded.progress, 0.05);
        assert!(loaded.updated_at > loaded.created_at);

        let history = store.history(job.id);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].progress, 0.05);
    }

    #[tokio::test]
    async fn test_completion_is_atomic_with_artifacts() {
        let store = MemoryJobStore::new();
        let job = store.create(new_job("alice")).await.unwrap();

        let artifacts = vec![NewArtifact {
            key: format!("{}/model.glb", job.id),
            kind: "glb".to_string(),
        }];
        store
            .complete_with_artifacts(job.id, &artifacts)
            .await
            .unwrap();

        let loaded = store.load(job.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.progress, 1.0);
        assert_eq!(store.artifacts(job.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_job_errors() {
        let store = MemoryJobStore::new();
        let missing = Uuid::new_v4();

        assert!(matches!(
            store
                .save_progress(missing, None, 0.0, JobStatus::Running, None)
                .await,
            Err(StoreError::NotFound)
        ));
        assert!(matches!(
            store.complete_with_artifacts(missing, &[]).await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_injected_outage() {
        let store = MemoryJobStore::new();
        let job = store.create(new_job("alice")).await.unwrap();

        store.set_fail_persistence(true);
        assert!(matches!(
            store
                .save_progress(job.id, None, 0.0, JobStatus::Running, None)
                .await,
            Err(StoreError::Unavailable(_))
        ));

        store.set_fail_persistence(false);
        assert!(store
            .save_progress(job.id, None, 0.0, JobStatus::Running, None)
            .await
            .is_ok());
    }
}
