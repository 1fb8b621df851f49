//! Worker pool: N execution slots draining the dispatch queue, each running
//! one pipeline execution to completion before claiming the next delivery.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::pipeline::Orchestrator;
use crate::services::queue::{Delivery, DispatchQueue, Dispatcher};

const POLL_INTERVAL_MS: u64 = 1000;
const DEPTH_GAUGE_INTERVAL_SECS: u64 = 5;

/// Run `slots` worker loops until the shutdown token fires. Shutdown is
/// graceful: in-flight executions run to completion, no new deliveries are
/// claimed afterwards.
pub async fn run_pool(
    queue: Arc<DispatchQueue>,
    orchestrator: Arc<Orchestrator>,
    slots: usize,
    shutdown: CancellationToken,
) {
    tracing::info!(slots, "starting worker pool");

    let mut tasks = JoinSet::new();

    for slot in 0..slots {
        let queue = queue.clone();
        let orchestrator = orchestrator.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            worker_loop(slot, queue, orchestrator, shutdown).await;
        });
    }

    {
        let queue = queue.clone();
        let shutdown = shutdown.clone();
        tasks.spawn(async move {
            depth_gauge_loop(queue, shutdown).await;
        });
    }

    while tasks.join_next().await.is_some() {}
    tracing::info!("worker pool stopped");
}

async fn worker_loop(
    slot: usize,
    queue: Arc<DispatchQueue>,
    orchestrator: Arc<Orchestrator>,
    shutdown: CancellationToken,
) {
    tracing::info!(slot, "worker slot ready");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                tracing::info!(slot, "worker slot shutting down");
                break;
            }
            claimed = queue.next() => match claimed {
                Ok(Some(delivery)) => {
                    handle_delivery(&queue, &orchestrator, delivery).await;
                }
                Ok(None) => {
                    sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                }
                Err(e) => {
                    tracing::error!(slot, error = %e, "failed to claim delivery, backing off");
                    sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
                }
            }
        }
    }
}

async fn handle_delivery(
    queue: &DispatchQueue,
    orchestrator: &Orchestrator,
    delivery: Delivery,
) {
    tracing::info!(job_id = %delivery.job_id, "processing delivery");

    match orchestrator.execute(delivery.job_id).await {
        Ok(outcome) => {
            tracing::debug!(job_id = %delivery.job_id, outcome = ?outcome, "execution finished");
            // Acknowledge regardless of completed/failed: the job reached a
            // persisted terminal state, so redelivery would only no-op.
            if let Err(e) = queue.ack(&delivery).await {
                tracing::error!(job_id = %delivery.job_id, error = %e, "failed to acknowledge delivery");
            }
        }
        Err(e) => {
            // Job state could not be persisted at all. Leave the delivery
            // unacknowledged so at-least-once redelivery retries later.
            tracing::error!(
                job_id = %delivery.job_id,
                error = %e,
                "execution could not persist job state, leaving delivery unacknowledged"
            );
        }
    }
}

async fn depth_gauge_loop(queue: Arc<DispatchQueue>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = sleep(Duration::from_secs(DEPTH_GAUGE_INTERVAL_SECS)) => {
                match queue.depth().await {
                    Ok(depth) => metrics::gauge!("generation_queue_depth").set(depth as f64),
                    Err(e) => tracing::warn!(error = %e, "failed to read queue depth"),
                }
            }
        }
    }
}
