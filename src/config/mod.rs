use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Optional for worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// PostgreSQL connection string
    pub database_url: String,

    /// Redis connection string for the dispatch queue
    pub redis_url: String,

    /// S3-compatible endpoint URL (MinIO, R2, AWS)
    pub s3_endpoint: String,

    /// S3 access key ID
    pub s3_access_key: String,

    /// S3 secret access key
    pub s3_secret_key: String,

    #[serde(default = "default_s3_region")]
    pub s3_region: String,

    /// Bucket for raw uploaded images
    #[serde(default = "default_bucket_uploads")]
    pub s3_bucket_uploads: String,

    /// Bucket for generated meshes and textures
    #[serde(default = "default_bucket_artifacts")]
    pub s3_bucket_artifacts: String,

    /// TTL for presigned artifact download URLs
    #[serde(default = "default_presign_ttl_secs")]
    pub presign_ttl_secs: u32,

    /// Concurrent execution slots per worker process
    #[serde(default = "default_worker_slots")]
    pub worker_slots: usize,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_s3_region() -> String {
    "us-east-1".to_string()
}

fn default_bucket_uploads() -> String {
    "uploads".to_string()
}

fn default_bucket_artifacts() -> String {
    "artifacts".to_string()
}

fn default_presign_ttl_secs() -> u32 {
    3600
}

fn default_worker_slots() -> usize {
    2
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }
}
