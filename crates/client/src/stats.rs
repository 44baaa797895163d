//! Per-attempt render statistics.
//!
//! Workers push one [`StatRecord`] per attempt into a [`StatsSink`]; the
//! client drains the receiving side at the end of a run and logs a
//! [`StatsSummary`].

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tessera_core::types::Job;
use tokio::sync::mpsc;

/// Outcome of one render attempt.
#[derive(Debug, Clone)]
pub struct StatRecord {
    pub endpoint: String,
    pub job: Job,
    pub elapsed: Duration,
    pub failed: bool,
    pub result: Option<PathBuf>,
    pub recorded_at: DateTime<Utc>,
}

impl StatRecord {
    pub fn success(endpoint: &str, job: Job, elapsed: Duration, result: PathBuf) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            job,
            elapsed,
            failed: false,
            result: Some(result),
            recorded_at: Utc::now(),
        }
    }

    pub fn failure(endpoint: &str, job: Job, elapsed: Duration) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            job,
            elapsed,
            failed: true,
            result: None,
            recorded_at: Utc::now(),
        }
    }
}

/// Append-only sending side; cheap to clone, one per worker.
#[derive(Debug, Clone)]
pub struct StatsSink {
    tx: mpsc::UnboundedSender<StatRecord>,
}

impl StatsSink {
    pub fn record(&self, record: StatRecord) {
        if self.tx.send(record).is_err() {
            tracing::debug!("Stats receiver dropped, discarding record");
        }
    }
}

/// Receiving side of a [`StatsSink`].
#[derive(Debug)]
pub struct StatsReceiver {
    rx: mpsc::UnboundedReceiver<StatRecord>,
}

impl StatsReceiver {
    /// Everything recorded so far, without waiting.
    pub fn drain(&mut self) -> Vec<StatRecord> {
        let mut records = Vec::new();
        while let Ok(record) = self.rx.try_recv() {
            records.push(record);
        }
        records
    }

    /// Wait for the next record; `None` once every sink is gone.
    pub async fn recv(&mut self) -> Option<StatRecord> {
        self.rx.recv().await
    }
}

pub fn channel() -> (StatsSink, StatsReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (StatsSink { tx }, StatsReceiver { rx })
}

/// Totals for one endpoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndpointSummary {
    pub succeeded: u32,
    pub failed: u32,
    /// Time spent on successful renders.
    pub render_time: Duration,
}

impl EndpointSummary {
    /// Mean duration of a successful render.
    pub fn mean_render_time(&self) -> Option<Duration> {
        (self.succeeded > 0).then(|| self.render_time / self.succeeded)
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub endpoints: BTreeMap<String, EndpointSummary>,
}

impl StatsSummary {
    pub fn from_records(records: &[StatRecord]) -> Self {
        let mut endpoints: BTreeMap<String, EndpointSummary> = BTreeMap::new();
        for record in records {
            let entry = endpoints.entry(record.endpoint.clone()).or_default();
            if record.failed {
                entry.failed += 1;
            } else {
                entry.succeeded += 1;
                entry.render_time += record.elapsed;
            }
        }
        Self { endpoints }
    }

    pub fn succeeded(&self) -> u32 {
        self.endpoints.values().map(|e| e.succeeded).sum()
    }

    pub fn failed(&self) -> u32 {
        self.endpoints.values().map(|e| e.failed).sum()
    }

    pub fn log(&self) {
        for (endpoint, summary) in &self.endpoints {
            tracing::info!(
                endpoint = %endpoint,
                succeeded = summary.succeeded,
                failed = summary.failed,
                mean_secs = summary.mean_render_time().map(|d| d.as_secs_f64()).unwrap_or(0.0),
                "Endpoint statistics",
            );
        }
        tracing::info!(
            succeeded = self.succeeded(),
            failed = self.failed(),
            "Render statistics",
        );
    }
}
