use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One output blob produced by a completed job (a mesh or a texture channel).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: i64,
    pub job_id: Uuid,
    pub key: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

/// Artifact fields recorded at job completion, before an id is assigned.
#[derive(Debug, Clone)]
pub struct NewArtifact {
    pub key: String,
    pub kind: String,
}
