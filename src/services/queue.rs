use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const QUEUE_KEY: &str = "meshgen:jobs";
const PROCESSING_KEY: &str = "meshgen:processing";

/// Dispatch event handed from the submission gateway to the worker pool.
#[derive(Debug, Serialize, Deserialize)]
pub struct DispatchEvent {
    pub job_id: Uuid,
}

/// One received delivery. The raw payload is retained so acknowledgment can
/// remove exactly this entry from the processing list.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub job_id: Uuid,
    payload: String,
}

/// Submission-side handle to the dispatch queue.
///
/// `submit` is fire-and-forget with at-least-once delivery: a worker may
/// receive the same job id more than once (e.g. after a crash before
/// acknowledgment), which is why the orchestrator is safe to invoke on jobs
/// in any state.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn submit(&self, job_id: Uuid) -> Result<(), QueueError>;

    /// Pending (not yet claimed) deliveries.
    async fn depth(&self) -> Result<u64, QueueError>;

    /// Connectivity probe for health checks.
    async fn ping(&self) -> Result<(), QueueError>;
}

/// Redis-backed dispatch queue.
///
/// Claiming moves the payload onto a processing list in one command, so a
/// delivery is handed to exactly one worker; it stays on the processing list
/// until acknowledged after `execute` returns. Requeueing entries stranded
/// on the processing list by a crashed worker is a broker-level concern
/// handled outside this service.
pub struct DispatchQueue {
    client: redis::Client,
}

impl DispatchQueue {
    pub fn new(redis_url: &str) -> Result<Self, QueueError> {
        let client = redis::Client::open(redis_url).map_err(QueueError::Redis)?;
        Ok(Self { client })
    }

    /// Claim the next delivery, if any.
    pub async fn next(&self) -> Result<Option<Delivery>, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let result: Option<String> = conn
            .rpoplpush(QUEUE_KEY, PROCESSING_KEY)
            .await
            .map_err(QueueError::Redis)?;

        match result {
            Some(payload) => {
                let event: DispatchEvent =
                    serde_json::from_str(&payload).map_err(QueueError::Serialize)?;
                Ok(Some(Delivery {
                    job_id: event.job_id,
                    payload,
                }))
            }
            None => Ok(None),
        }
    }

    /// Acknowledge a delivery, removing it from the processing list.
    pub async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        conn.lrem::<_, _, ()>(PROCESSING_KEY, 1, &delivery.payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

#[async_trait]
impl Dispatcher for DispatchQueue {
    async fn submit(&self, job_id: Uuid) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let payload =
            serde_json::to_string(&DispatchEvent { job_id }).map_err(QueueError::Serialize)?;
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        let depth: u64 = conn.llen(QUEUE_KEY).await.map_err(QueueError::Redis)?;
        Ok(depth)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Redis)?;
        redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .map_err(QueueError::Redis)?;
        Ok(())
    }
}

/// In-memory dispatcher for tests: records submissions in order and lets the
/// test drive deliveries by hand.
#[derive(Default)]
pub struct MemoryDispatcher {
    pending: Mutex<VecDeque<Uuid>>,
}

impl MemoryDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pop the next pending job id, as a worker slot would.
    pub fn next_job(&self) -> Option<Uuid> {
        self.pending.lock().pop_front()
    }
}

#[async_trait]
impl Dispatcher for MemoryDispatcher {
    async fn submit(&self, job_id: Uuid) -> Result<(), QueueError> {
        self.pending.lock().push_back(job_id);
        Ok(())
    }

    async fn depth(&self) -> Result<u64, QueueError> {
        Ok(self.pending.lock().len() as u64)
    }

    async fn ping(&self) -> Result<(), QueueError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_event_roundtrip() {
        let event = DispatchEvent {
            job_id: Uuid::new_v4(),
        };
        let payload = serde_json::to_string(&event).unwrap();
        let parsed: DispatchEvent = serde_json::from_str(&payload).unwrap();
        assert_eq!(parsed.job_id, event.job_id);
    }

    #[tokio::test]
    async fn test_memory_dispatcher_preserves_order() {
        let dispatcher = MemoryDispatcher::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        dispatcher.submit(first).await.unwrap();
        dispatcher.submit(second).await.unwrap();

        assert_eq!(dispatcher.depth().await.unwrap(), 2);
        assert_eq!(dispatcher.next_job(), Some(first));
        assert_eq!(dispatcher.next_job(), Some(second));
        assert_eq!(dispatcher.next_job(), None);
    }
}
