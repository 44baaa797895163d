//! Tessera render client library.
//!
//! A [`pool::WorkerPool`] owns a shared [`queue::JobQueue`] of render jobs
//! and one [`worker::Worker`] per render endpoint. Workers hand failed jobs
//! back to the queue for another worker to pick up and report every attempt
//! to a [`stats::StatsSink`].

pub mod config;
pub mod discovery;
pub mod endpoint;
pub mod pool;
pub mod queue;
pub mod rpc;
pub mod stats;
pub mod worker;
