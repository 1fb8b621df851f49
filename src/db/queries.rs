use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use uuid::Uuid;

use crate::models::artifact::{Artifact, NewArtifact};
use crate::models::job::{Job, JobStatus, NewJob};
use crate::models::job_log::LogLevel;
use crate::pipeline::stage::Stage;

const JOB_COLUMNS: &str = "id, owner, input_key, input_filename, mode, target_format, \
                           max_polygons, status, stage, progress, error, created_at, updated_at";

fn decode_error(
    index: &str,
    source: impl std::error::Error + Send + Sync + 'static,
) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: index.to_string(),
        source: Box::new(source),
    }
}

fn job_from_row(row: &PgRow) -> Result<Job, sqlx::Error> {
    let status_raw: String = row.try_get("status")?;
    let status = status_raw
        .parse::<JobStatus>()
        .map_err(|e| decode_error("status", e))?;

    let stage_raw: Option<String> = row.try_get("stage")?;
    let stage = stage_raw
        .map(|s| s.parse::<Stage>().map_err(|e| decode_error("stage", e)))
        .transpose()?;

    Ok(Job {
        id: row.try_get("id")?,
        owner: row.try_get("owner")?,
        input_key: row.try_get("input_key")?,
        input_filename: row.try_get("input_filename")?,
        mode: row.try_get("mode")?,
        target_format: row.try_get("target_format")?,
        max_polygons: row.try_get("max_polygons")?,
        status,
        stage,
        progress: row.try_get("progress")?,
        error: row.try_get("error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn artifact_from_row(row: &PgRow) -> Result<Artifact, sqlx::Error> {
    Ok(Artifact {
        id: row.try_get("id")?,
        job_id: row.try_get("job_id")?,
        key: row.try_get("key")?,
        kind: row.try_get("kind")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Insert a new generation job in `queued` state.
pub async fn create_job(pool: &PgPool, new: &NewJob) -> Result<Job, sqlx::Error> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO jobs (id, owner, input_key, input_filename, mode, target_format, max_polygons)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {JOB_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&new.owner)
    .bind(&new.input_key)
    .bind(&new.input_filename)
    .bind(&new.mode)
    .bind(&new.target_format)
    .bind(new.max_polygons)
    .fetch_one(pool)
    .await?;

    job_from_row(&row)
}

/// Get a job by id.
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1"))
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Get a job by id, scoped to its owner.
pub async fn get_job_owned(
    pool: &PgPool,
    job_id: Uuid,
    owner: &str,
) -> Result<Option<Job>, sqlx::Error> {
    let row = sqlx::query(&format!(
        "SELECT {JOB_COLUMNS} FROM jobs WHERE id = $1 AND owner = $2"
    ))
    .bind(job_id)
    .bind(owner)
    .fetch_optional(pool)
    .await?;

    row.as_ref().map(job_from_row).transpose()
}

/// Persist stage, progress, status, and error in one atomic mutation.
/// Returns the number of rows updated (0 when the job does not exist).
pub async fn save_progress(
    pool: &PgPool,
    job_id: Uuid,
    stage: Option<Stage>,
    progress: f64,
    status: JobStatus,
    error: Option<&str>,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = $1, stage = $2, progress = $3, error = $4, updated_at = NOW()
        WHERE id = $5
        "#,
    )
    .bind(status.to_string())
    .bind(stage.map(|s| s.to_string()))
    .bind(progress)
    .bind(error)
    .bind(job_id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Insert artifact records on an existing connection (shared with the
/// completion transaction).
pub async fn insert_artifacts(
    conn: &mut PgConnection,
    job_id: Uuid,
    artifacts: &[NewArtifact],
) -> Result<(), sqlx::Error> {
    for artifact in artifacts {
        sqlx::query("INSERT INTO artifacts (job_id, key, kind) VALUES ($1, $2, $3)")
            .bind(job_id)
            .bind(&artifact.key)
            .bind(&artifact.kind)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Atomically insert the artifact set and flip the job to `completed` with
/// progress `1.0`. A reader never observes `completed` without the artifacts
/// already queryable. Returns the number of job rows updated.
pub async fn complete_with_artifacts(
    pool: &PgPool,
    job_id: Uuid,
    artifacts: &[NewArtifact],
) -> Result<u64, sqlx::Error> {
    let mut tx = pool.begin().await?;

    insert_artifacts(&mut *tx, job_id, artifacts).await?;

    let result = sqlx::query(
        r#"
        UPDATE jobs
        SET status = 'completed', progress = 1.0, error = NULL, updated_at = NOW()
        WHERE id = $1
        "#,
    )
    .bind(job_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(result.rows_affected())
}

/// List the artifacts of a job.
pub async fn list_artifacts(pool: &PgPool, job_id: Uuid) -> Result<Vec<Artifact>, sqlx::Error> {
    let rows = sqlx::query(
        "SELECT id, job_id, key, kind, created_at FROM artifacts WHERE job_id = $1 ORDER BY id",
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.iter().map(artifact_from_row).collect()
}

/// Append a diagnostic log entry for a job.
pub async fn append_log(
    pool: &PgPool,
    job_id: Uuid,
    level: LogLevel,
    message: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("INSERT INTO job_logs (job_id, level, message) VALUES ($1, $2, $3)")
        .bind(job_id)
        .bind(level.to_string())
        .bind(message)
        .execute(pool)
        .await?;
    Ok(())
}
