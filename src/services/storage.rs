use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use s3::creds::Credentials;
use s3::{Bucket, BucketConfiguration, Region};

use crate::config::AppConfig;

/// Logical buckets the system addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum BucketKind {
    Uploads,
    Artifacts,
}

/// Key/value blob storage with presigned-URL retrieval over the two logical
/// buckets. Buckets are lazily creatable; `ensure_buckets` is idempotent.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn ensure_buckets(&self) -> Result<(), StorageError>;

    async fn put(
        &self,
        bucket: BucketKind,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn get(&self, bucket: BucketKind, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Time-limited URL granting direct read access to one blob.
    async fn presign_get(
        &self,
        bucket: BucketKind,
        key: &str,
        ttl_secs: u32,
    ) -> Result<String, StorageError>;
}

/// Client for S3-compatible object storage (MinIO, R2, AWS).
pub struct S3BlobStore {
    uploads: Box<Bucket>,
    artifacts: Box<Bucket>,
    region: Region,
    credentials: Credentials,
}

impl S3BlobStore {
    pub fn new(config: &AppConfig) -> Result<Self, StorageError> {
        let region = Region::Custom {
            region: config.s3_region.clone(),
            endpoint: config.s3_endpoint.clone(),
        };

        let credentials = Credentials::new(
            Some(&config.s3_access_key),
            Some(&config.s3_secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| StorageError::Config(e.to_string()))?;

        // Path-style addressing for MinIO and other custom endpoints.
        let uploads = Bucket::new(&config.s3_bucket_uploads, region.clone(), credentials.clone())
            .map_err(|e| StorageError::Config(e.to_string()))?
            .with_path_style();
        let artifacts = Bucket::new(
            &config.s3_bucket_artifacts,
            region.clone(),
            credentials.clone(),
        )
        .map_err(|e| StorageError::Config(e.to_string()))?
        .with_path_style();

        Ok(Self {
            uploads,
            artifacts,
            region,
            credentials,
        })
    }

    fn bucket(&self, kind: BucketKind) -> &Bucket {
        match kind {
            BucketKind::Uploads => &self.uploads,
            BucketKind::Artifacts => &self.artifacts,
        }
    }

    async fn ensure(&self, bucket: &Bucket) -> Result<(), StorageError> {
        if bucket.exists().await.map_err(StorageError::S3)? {
            return Ok(());
        }

        match Bucket::create_with_path_style(
            &bucket.name(),
            self.region.clone(),
            self.credentials.clone(),
            BucketConfiguration::default(),
        )
        .await
        {
            Ok(_) => Ok(()),
            // Lost a creation race; the bucket exists, which is all we need.
            Err(e)
                if e.to_string().contains("BucketAlreadyOwnedByYou")
                    || e.to_string().contains("BucketAlreadyExists") =>
            {
                Ok(())
            }
            Err(e) => Err(StorageError::S3(e)),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn ensure_buckets(&self) -> Result<(), StorageError> {
        self.ensure(&self.uploads).await?;
        self.ensure(&self.artifacts).await?;
        Ok(())
    }

    async fn put(
        &self,
        bucket: BucketKind,
        key: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.bucket(bucket)
            .put_object_with_content_type(key, bytes, content_type)
            .await
            .map_err(StorageError::S3)?;
        Ok(())
    }

    async fn get(&self, bucket: BucketKind, key: &str) -> Result<Vec<u8>, StorageError> {
        match self.bucket(bucket).get_object(key).await {
            Ok(response) => Ok(response.to_vec()),
            Err(s3::error::S3Error::HttpFailWithBody(404, _)) => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(StorageError::S3(e)),
        }
    }

    async fn presign_get(
        &self,
        bucket: BucketKind,
        key: &str,
        ttl_secs: u32,
    ) -> Result<String, StorageError> {
        self.bucket(bucket)
            .presign_get(key, ttl_secs, None)
            .await
            .map_err(StorageError::S3)
    }
}

/// In-memory blob store for tests and local development.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<(BucketKind, String), Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self, bucket: BucketKind) -> usize {
        self.objects
            .lock()
            .keys()
            .filter(|(kind, _)| *kind == bucket)
            .count()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn ensure_buckets(&self) -> Result<(), StorageError> {
        Ok(())
    }

    async fn put(
        &self,
        bucket: BucketKind,
        key: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<(), StorageError> {
        self.objects
            .lock()
            .insert((bucket, key.to_string()), bytes.to_vec());
        Ok(())
    }

    async fn get(&self, bucket: BucketKind, key: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .get(&(bucket, key.to_string()))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn presign_get(
        &self,
        bucket: BucketKind,
        key: &str,
        ttl_secs: u32,
    ) -> Result<String, StorageError> {
        if !self.objects.lock().contains_key(&(bucket, key.to_string())) {
            return Err(StorageError::NotFound(key.to_string()));
        }
        Ok(format!("memory://{bucket}/{key}?expires={ttl_secs}"))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("S3 operation failed: {0}")]
    S3(#[from] s3::error::S3Error),

    #[error("storage configuration error: {0}")]
    Config(String),
}
