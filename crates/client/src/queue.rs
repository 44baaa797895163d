//! Shared FIFO of render jobs with explicit acknowledgement.
//!
//! Taking a job out of the queue hands out a [`Lease`]. The lease is settled
//! exactly once: [`Lease::complete`] acknowledges it, [`Lease::requeue`]
//! acknowledges it and puts the job back at the tail in the same critical
//! section, and dropping an unsettled lease requeues. So at every point
//!
//! ```text
//! enqueued == acknowledged + pending
//! ```
//!
//! where `pending` counts queued jobs plus leased ones. "Drained" means no
//! job is queued and no lease is outstanding, which is different from
//! "currently empty": a leased job may still come back.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

/// Snapshot of the queue bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueCounts {
    pub enqueued: u64,
    pub acknowledged: u64,
    pub queued: u64,
    pub in_flight: u64,
}

impl QueueCounts {
    /// Jobs not yet acknowledged: queued plus leased.
    pub fn pending(&self) -> u64 {
        self.queued + self.in_flight
    }

    pub fn is_drained(&self) -> bool {
        self.pending() == 0
    }
}

/// Result of a non-blocking dequeue attempt.
#[derive(Debug)]
pub enum Dequeue<J: Clone> {
    Job(Lease<J>),
    /// Nothing queued, but leased jobs may still be requeued.
    Empty,
    /// Nothing queued and nothing leased.
    Drained,
    Closed,
}

struct QueueState<J> {
    items: VecDeque<J>,
    enqueued: u64,
    acknowledged: u64,
    in_flight: u64,
    closed: bool,
}

pub struct JobQueue<J> {
    state: Mutex<QueueState<J>>,
    changed: Notify,
}

impl<J: Clone> Default for JobQueue<J> {
    fn default() -> Self {
        Self::new()
    }
}

impl<J: Clone> JobQueue<J> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                enqueued: 0,
                acknowledged: 0,
                in_flight: 0,
                closed: false,
            }),
            changed: Notify::new(),
        }
    }

    pub fn with_jobs(jobs: impl IntoIterator<Item = J>) -> Self {
        let queue = Self::new();
        for job in jobs {
            queue.push(job);
        }
        queue
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<J>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a job at the tail.
    pub fn push(&self, job: J) {
        {
            let mut state = self.lock();
            state.items.push_back(job);
            state.enqueued += 1;
        }
        self.changed.notify_waiters();
    }

    /// Stop handing out jobs. Outstanding leases may still be settled.
    pub fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_waiters();
    }

    pub fn counts(&self) -> QueueCounts {
        let state = self.lock();
        QueueCounts {
            enqueued: state.enqueued,
            acknowledged: state.acknowledged,
            queued: state.items.len() as u64,
            in_flight: state.in_flight,
        }
    }

    /// Queued jobs in dequeue order.
    pub fn snapshot(&self) -> Vec<J> {
        self.lock().items.iter().cloned().collect()
    }

    /// Take the head job if there is one; emptiness and removal are decided
    /// under one lock.
    pub fn try_next(self: &Arc<Self>) -> Dequeue<J> {
        let mut state = self.lock();
        if state.closed {
            return Dequeue::Closed;
        }
        match state.items.pop_front() {
            Some(job) => {
                state.in_flight += 1;
                Dequeue::Job(Lease {
                    queue: Arc::clone(self),
                    job,
                    settled: false,
                })
            }
            None if state.in_flight == 0 => Dequeue::Drained,
            None => Dequeue::Empty,
        }
    }

    /// Wait for the next job. Returns `None` once the queue is drained or
    /// closed; while other leases are outstanding it keeps waiting, since
    /// their jobs may be requeued.
    pub async fn next(self: &Arc<Self>) -> Option<Lease<J>> {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            match self.try_next() {
                Dequeue::Job(lease) => return Some(lease),
                Dequeue::Drained | Dequeue::Closed => return None,
                Dequeue::Empty => notified.await,
            }
        }
    }

    /// Resolve once every job has been acknowledged.
    pub async fn wait_drained(&self) {
        loop {
            let notified = self.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.counts().is_drained() {
                return;
            }
            notified.await;
        }
    }

    fn settle(&self, requeue: Option<J>) {
        {
            let mut state = self.lock();
            state.in_flight -= 1;
            state.acknowledged += 1;
            if let Some(job) = requeue {
                state.items.push_back(job);
                state.enqueued += 1;
            }
        }
        self.changed.notify_waiters();
    }
}

/// A job taken from a [`JobQueue`], settled exactly once.
#[derive(Debug)]
pub struct Lease<J: Clone> {
    queue: Arc<JobQueue<J>>,
    job: J,
    settled: bool,
}

impl<J: Clone> Lease<J> {
    pub fn job(&self) -> &J {
        &self.job
    }

    /// Acknowledge successful completion.
    pub fn complete(mut self) {
        self.settled = true;
        self.queue.settle(None);
    }

    /// Acknowledge and put the job back at the tail.
    pub fn requeue(mut self) {
        self.settled = true;
        self.queue.settle(Some(self.job.clone()));
    }
}

impl<J: Clone> Drop for Lease<J> {
    fn drop(&mut self) {
        if !self.settled {
            self.settled = true;
            self.queue.settle(Some(self.job.clone()));
        }
    }
}

impl<J> std::fmt::Debug for JobQueue<J> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue").finish_non_exhaustive()
    }
}
