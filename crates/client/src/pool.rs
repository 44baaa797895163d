//! The set of workers sharing one job queue.

use std::sync::Arc;
use std::time::Duration;

use tessera_core::types::Job;
use tokio_util::sync::CancellationToken;

use crate::endpoint::RenderEndpoint;
use crate::queue::{JobQueue, QueueCounts};
use crate::stats::StatsSink;
use crate::worker::Worker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolStatus {
    /// At least one worker is still running.
    Running,
    /// Every job acknowledged and every worker stopped.
    Completed,
    /// Every worker stopped with work left in the queue.
    Stalled,
}

/// Liveness of one endpoint's worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointHealth {
    pub endpoint: String,
    pub alive: bool,
    pub failed: bool,
}

/// Owns the job queue and one worker per endpoint.
///
/// Workers that stop after a failure are not restarted. Their job has been
/// requeued for the remaining workers; if none remain the pool reports
/// [`PoolStatus::Stalled`].
pub struct WorkerPool {
    queue: Arc<JobQueue<Job>>,
    workers: Vec<Worker>,
    cancel: CancellationToken,
}

impl WorkerPool {
    pub fn new(jobs: impl IntoIterator<Item = Job>) -> Self {
        Self {
            queue: Arc::new(JobQueue::with_jobs(jobs)),
            workers: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue<Job>> {
        &self.queue
    }

    pub fn counts(&self) -> QueueCounts {
        self.queue.counts()
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    /// Bind a new worker to `endpoint`.
    pub fn spawn_worker(&mut self, endpoint: Box<dyn RenderEndpoint>, stats: StatsSink) {
        let worker = Worker::spawn(
            endpoint,
            Arc::clone(&self.queue),
            stats,
            self.cancel.child_token(),
        );
        tracing::info!(endpoint = %worker.label(), "Worker bound to endpoint");
        self.workers.push(worker);
    }

    pub fn status(&self) -> PoolStatus {
        if self.workers.iter().any(Worker::is_alive) {
            return PoolStatus::Running;
        }
        if self.queue.counts().is_drained() {
            PoolStatus::Completed
        } else {
            PoolStatus::Stalled
        }
    }

    /// Poll until the pool is no longer running. The last acknowledgement
    /// wakes the wait early.
    pub async fn wait(&self, poll: Duration) -> PoolStatus {
        let mut interval = tokio::time::interval(poll);
        let mut drained = false;
        loop {
            tokio::select! {
                () = self.queue.wait_drained(), if !drained => drained = true,
                _ = interval.tick() => {}
            }
            let status = self.status();
            if status != PoolStatus::Running {
                return status;
            }
        }
    }

    pub fn endpoint_health(&self) -> Vec<EndpointHealth> {
        self.workers
            .iter()
            .map(|w| EndpointHealth {
                endpoint: w.label().to_string(),
                alive: w.is_alive(),
                failed: w.last_failure(),
            })
            .collect()
    }

    /// Ask every worker to stop before its next job.
    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    /// Stop every worker and wait for their tasks to end. Jobs still queued
    /// stay queued; no further leases are handed out.
    pub async fn shutdown(self) {
        self.request_stop();
        self.queue.close();
        for worker in self.workers {
            worker.join().await;
        }
    }
}
