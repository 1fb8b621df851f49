use chrono::{DateTime, Utc};
use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::pipeline::stage::Stage;

/// Status of a generation job in the async pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, strum::Display, strum::EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Failed,
    Completed,
}

impl JobStatus {
    /// Terminal statuses admit no further stage execution.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// An image-to-3D generation job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub owner: String,
    pub input_key: String,
    pub input_filename: Option<String>,
    pub mode: String,
    pub target_format: String,
    pub max_polygons: Option<i32>,
    pub status: JobStatus,
    pub stage: Option<Stage>,
    pub progress: f64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a job record.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub owner: String,
    pub input_key: String,
    pub input_filename: Option<String>,
    pub mode: String,
    pub target_format: String,
    pub max_polygons: Option<i32>,
}

/// User-supplied generation parameters (multipart form fields).
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct JobParams {
    #[garde(custom(allowed_mode))]
    pub mode: String,

    #[garde(custom(allowed_format))]
    pub target_format: String,

    #[garde(inner(range(min = 1_000, max = 2_000_000)))]
    pub max_polygons: Option<i32>,
}

pub const MODES: [&str; 2] = ["fast", "high_quality"];
pub const TARGET_FORMATS: [&str; 3] = ["glb", "obj", "stl"];

pub fn default_mode() -> String {
    "high_quality".to_string()
}

pub fn default_target_format() -> String {
    "glb".to_string()
}

fn allowed_mode(value: &str, _ctx: &()) -> garde::Result {
    if MODES.contains(&value) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "mode must be one of: {}",
            MODES.join(", ")
        )))
    }
}

fn allowed_format(value: &str, _ctx: &()) -> garde::Result {
    if TARGET_FORMATS.contains(&value) {
        Ok(())
    } else {
        Err(garde::Error::new(format!(
            "target_format must be one of: {}",
            TARGET_FORMATS.join(", ")
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let params = JobParams {
            mode: default_mode(),
            target_format: default_target_format(),
            max_polygons: None,
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_mode() {
        let params = JobParams {
            mode: "ultra".to_string(),
            target_format: "glb".to_string(),
            max_polygons: None,
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_format() {
        let params = JobParams {
            mode: "fast".to_string(),
            target_format: "fbx".to_string(),
            max_polygons: None,
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_rejects_out_of_range_polygons() {
        let params = JobParams {
            mode: "fast".to_string(),
            target_format: "glb".to_string(),
            max_polygons: Some(10),
        };
        assert!(params.validate().is_err());

        let params = JobParams {
            mode: "fast".to_string(),
            target_format: "glb".to_string(),
            max_polygons: Some(20_000),
        };
        assert!(params.validate().is_ok());
    }

    #[test]
    fn test_status_terminality() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }

    #[test]
    fn test_status_name_roundtrip() {
        for status in [
            JobStatus::Queued,
            JobStatus::Running,
            JobStatus::Failed,
            JobStatus::Completed,
        ] {
            let parsed: JobStatus = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }
}
