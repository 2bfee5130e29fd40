//! Job queue and worker pool
//!
//! The `workflow_runs` table is the durable queue; the in-memory channel only carries
//! run ids to workers. On startup `recover_runs` re-submits QUEUED runs and fails runs a
//! crashed process left in RUNNING.
//!
//! Shutdown: cancelling the token stops workers from taking new jobs. A worker that
//! is executing a run finishes it first.

use anyhow::{anyhow, Result};
use sqlx::SqlitePool;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::workflow_orchestrator::WorkflowOrchestrator;
use crate::db;
use crate::models::{RunFailure, RunStatus};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum QueueError {
    #[error("Job queue is full")]
    Full,

    #[error("Job queue is closed")]
    Closed,
}

/// Sending half: cloned into the API state
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::Sender<Uuid>,
}

/// Receiving half, shared by every worker
pub struct JobReceiver {
    rx: Arc<Mutex<mpsc::Receiver<Uuid>>>,
}

impl JobQueue {
    pub fn new(capacity: usize) -> (JobQueue, JobReceiver) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (
            JobQueue { tx },
            JobReceiver {
                rx: Arc::new(Mutex::new(rx)),
            },
        )
    }

    /// Enqueue without waiting
    pub fn submit(&self, workflow_id: Uuid) -> Result<(), QueueError> {
        self.tx.try_send(workflow_id).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => QueueError::Full,
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        })?;
        tracing::debug!(workflow_id = %workflow_id, depth = self.depth(), "Run enqueued");
        Ok(())
    }

    /// Enqueue, waiting for room
    pub async fn submit_wait(&self, workflow_id: Uuid) -> Result<(), QueueError> {
        self.tx.send(workflow_id).await.map_err(|_| QueueError::Closed)
    }

    /// Jobs waiting for a worker
    pub fn depth(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}

/// Fixed set of workers draining the queue
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn start(
        orchestrator: Arc<WorkflowOrchestrator>,
        receiver: JobReceiver,
        workers: usize,
        shutdown: CancellationToken,
    ) -> Self {
        let handles = (0..workers.max(1))
            .map(|worker_id| {
                let orchestrator = Arc::clone(&orchestrator);
                let rx = Arc::clone(&receiver.rx);
                let shutdown = shutdown.clone();
                tokio::spawn(worker_loop(worker_id, orchestrator, rx, shutdown))
            })
            .collect();

        tracing::info!(workers = workers.max(1), "Worker pool started");
        Self { handles }
    }

    /// Wait for every worker to exit
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task panicked");
            }
        }
    }
}

async fn worker_loop(
    worker_id: usize,
    orchestrator: Arc<WorkflowOrchestrator>,
    rx: Arc<Mutex<mpsc::Receiver<Uuid>>>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => None,
            job = async { rx.lock().await.recv().await } => job,
        };

        let Some(workflow_id) = next else {
            tracing::debug!(worker_id, "Worker stopping");
            break;
        };

        tracing::info!(worker_id, workflow_id = %workflow_id, "Worker picked up run");

        match orchestrator.execute(workflow_id).await {
            Ok(status) => {
                tracing::info!(worker_id, workflow_id = %workflow_id, status = %status, "Run finished");
            }
            Err(e) => {
                tracing::error!(worker_id, workflow_id = %workflow_id, error = ?e, "Run execution errored, marking failed");
                if let Err(fallback) = orchestrator.fail_run(workflow_id, &e).await {
                    tracing::error!(
                        worker_id,
                        workflow_id = %workflow_id,
                        error = %fallback,
                        "Could not mark run failed"
                    );
                }
            }
        }
    }
}

/// Outcome of startup recovery
#[derive(Debug, Default, PartialEq)]
pub struct RecoveryReport {
    pub requeued: usize,
    pub interrupted: usize,
}

/// Re-submit QUEUED runs and fail RUNNING runs left by a previous process
///
/// Call after the worker pool has started: re-submission waits for queue space.
pub async fn recover_runs(pool: &SqlitePool, queue: &JobQueue) -> Result<RecoveryReport> {
    let mut report = RecoveryReport::default();

    for mut run in db::runs::runs_with_status(pool, RunStatus::Running).await? {
        let error = anyhow!("Service restarted while the run was executing");
        run.metadata.error = Some(RunFailure::from_error(&error, None));
        run.metadata.interrupted = true;
        run.transition_to(RunStatus::Failed)?;
        db::runs::update_run(pool, &run).await?;

        tracing::warn!(workflow_id = %run.id, user_id = %run.user_id, "Interrupted run marked failed");
        report.interrupted += 1;
    }

    for run in db::runs::runs_with_status(pool, RunStatus::Queued).await? {
        queue.submit_wait(run.id).await?;
        report.requeued += 1;
    }

    if report.requeued > 0 || report.interrupted > 0 {
        tracing::info!(
            requeued = report.requeued,
            interrupted = report.interrupted,
            "Recovered runs from previous process"
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkflowRun;

    #[tokio::test]
    async fn test_depth_tracks_pending_jobs() {
        let (queue, receiver) = JobQueue::new(4);
        assert_eq!(queue.depth(), 0);

        queue.submit(Uuid::new_v4()).unwrap();
        queue.submit(Uuid::new_v4()).unwrap();
        assert_eq!(queue.depth(), 2);

        receiver.rx.lock().await.recv().await.unwrap();
        assert_eq!(queue.depth(), 1);
    }

    #[test]
    fn test_full_and_closed_queue_rejected() {
        let (queue, receiver) = JobQueue::new(1);
        queue.submit(Uuid::new_v4()).unwrap();
        assert_eq!(queue.submit(Uuid::new_v4()), Err(QueueError::Full));

        drop(receiver);
        assert_eq!(queue.submit(Uuid::new_v4()), Err(QueueError::Closed));
    }

    #[tokio::test]
    async fn test_recovery_requeues_and_interrupts() {
        let pool = db::init_in_memory_pool().await.unwrap();

        let queued = WorkflowRun::new("user_a", "https://a.com");
        db::runs::insert_run(&pool, &queued).await.unwrap();

        let mut running = WorkflowRun::new("user_b", "https://b.com");
        db::runs::insert_run(&pool, &running).await.unwrap();
        running.transition_to(RunStatus::Running).unwrap();
        db::runs::update_run(&pool, &running).await.unwrap();

        let (queue, receiver) = JobQueue::new(8);
        let report = recover_runs(&pool, &queue).await.unwrap();
        assert_eq!(report, RecoveryReport { requeued: 1, interrupted: 1 });

        assert_eq!(receiver.rx.lock().await.recv().await, Some(queued.id));

        let failed = db::runs::load_run(&pool, running.id).await.unwrap().unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert!(failed.metadata.interrupted);
        assert!(failed.metadata.error.is_some());

        let still_queued = db::runs::load_run(&pool, queued.id).await.unwrap().unwrap();
        assert_eq!(still_queued.status, RunStatus::Queued);
    }

    #[tokio::test]
    async fn test_workers_stop_on_shutdown() {
        let pool = db::init_in_memory_pool().await.unwrap();
        let config = crate::config::ServiceConfig::default();
        let orchestrator = Arc::new(
            WorkflowOrchestrator::new(pool, mintel_common::events::EventBus::new(10), &config).unwrap(),
        );

        let (_queue, receiver) = JobQueue::new(4);
        let shutdown = CancellationToken::new();
        let workers = WorkerPool::start(orchestrator, receiver, 3, shutdown.clone());

        shutdown.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(5), workers.join())
            .await
            .unwrap();
    }
}
