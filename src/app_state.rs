use std::sync::Arc;

use crate::services::queue::Dispatcher;
use crate::services::storage::BlobStore;
use crate::store::JobStore;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: Arc<dyn JobStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub dispatcher: Arc<dyn Dispatcher>,
    pub presign_ttl_secs: u32,
}

impl AppState {
    pub fn new(
        jobs: Arc<dyn JobStore>,
        blobs: Arc<dyn BlobStore>,
        dispatcher: Arc<dyn Dispatcher>,
        presign_ttl_secs: u32,
    ) -> Self {
        Self {
            jobs,
            blobs,
            dispatcher,
            presign_ttl_secs,
        }
    }
}
