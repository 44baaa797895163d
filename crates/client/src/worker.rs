//! A worker bound to one render endpoint.
//!
//! The worker pulls jobs from the shared queue until the queue is drained,
//! a stop is requested, or a render fails. A failed job goes back to the
//! tail of the queue for whichever worker takes it next, and the worker
//! exits instead of retrying its own endpoint.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tessera_core::error::CoreError;
use tessera_core::types::Job;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::endpoint::RenderEndpoint;
use crate::queue::JobQueue;
use crate::stats::{StatRecord, StatsSink};

/// Outcome of one render step.
#[derive(Debug)]
pub enum RenderOutcome {
    Success(PathBuf),
    /// The endpoint could not be reached or the connection broke.
    TransportFailure(String),
    /// The endpoint answered with a fault.
    RemoteFailure { code: String, message: String },
    /// Something on this machine failed (scene file, output directory, engine).
    LocalFailure(String),
}

impl From<Result<PathBuf, CoreError>> for RenderOutcome {
    fn from(result: Result<PathBuf, CoreError>) -> Self {
        match result {
            Ok(path) => RenderOutcome::Success(path),
            Err(CoreError::Transport(msg)) => RenderOutcome::TransportFailure(msg),
            Err(CoreError::RemoteFault { code, message }) => {
                RenderOutcome::RemoteFailure { code, message }
            }
            Err(other) => RenderOutcome::LocalFailure(other.to_string()),
        }
    }
}

#[derive(Debug, Default)]
struct WorkerFlags {
    running: AtomicBool,
    failed: AtomicBool,
}

/// Clears the running flag however the worker task ends.
struct RunningGuard(Arc<WorkerFlags>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.store(false, Ordering::SeqCst);
    }
}

pub struct Worker {
    label: String,
    flags: Arc<WorkerFlags>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Worker {
    /// Start a worker task bound to `endpoint`. `cancel` stops it before its
    /// next dequeue; an in-flight render is not interrupted.
    pub fn spawn(
        endpoint: Box<dyn RenderEndpoint>,
        queue: Arc<JobQueue<Job>>,
        stats: StatsSink,
        cancel: CancellationToken,
    ) -> Self {
        let label = endpoint.label().to_string();
        let flags = Arc::new(WorkerFlags::default());
        flags.running.store(true, Ordering::SeqCst);

        let handle = tokio::spawn(run(
            endpoint,
            queue,
            stats,
            Arc::clone(&flags),
            cancel.clone(),
        ));

        Self {
            label,
            flags,
            cancel,
            handle,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// The worker loop is still running.
    pub fn is_alive(&self) -> bool {
        self.flags.running.load(Ordering::SeqCst)
    }

    /// The worker stopped because a render failed.
    pub fn last_failure(&self) -> bool {
        self.flags.failed.load(Ordering::SeqCst)
    }

    /// Still running, or finished without ever failing.
    pub fn service_alive(&self) -> bool {
        self.is_alive() || !self.last_failure()
    }

    pub fn request_stop(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker task to end.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            tracing::error!(endpoint = %self.label, error = %e, "Worker task panicked");
        }
    }
}

async fn run(
    mut endpoint: Box<dyn RenderEndpoint>,
    queue: Arc<JobQueue<Job>>,
    stats: StatsSink,
    flags: Arc<WorkerFlags>,
    cancel: CancellationToken,
) {
    let _guard = RunningGuard(Arc::clone(&flags));
    let label = endpoint.label().to_string();
    tracing::info!(endpoint = %label, "Worker started");

    loop {
        let lease = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(endpoint = %label, "Worker stop requested");
                break;
            }
            next = queue.next() => match next {
                Some(lease) => lease,
                None => break,
            },
        };

        let job = *lease.job();
        tracing::debug!(endpoint = %label, job = %job, "Rendering");
        let started = Instant::now();
        let outcome = RenderOutcome::from(endpoint.render(&job).await);
        let elapsed = started.elapsed();

        match outcome {
            RenderOutcome::Success(path) => {
                lease.complete();
                tracing::info!(
                    endpoint = %label,
                    job = %job,
                    elapsed_secs = elapsed.as_secs_f64(),
                    result = %path.display(),
                    "Job rendered",
                );
                stats.record(StatRecord::success(&label, job, elapsed, path));
            }
            failure => {
                lease.requeue();
                tracing::warn!(
                    endpoint = %label,
                    job = %job,
                    outcome = ?failure,
                    "Render failed, job requeued and worker stopping",
                );
                stats.record(StatRecord::failure(&label, job, elapsed));
                flags.failed.store(true, Ordering::SeqCst);
                break;
            }
        }
    }

    tracing::info!(endpoint = %label, "Worker terminated");
}
