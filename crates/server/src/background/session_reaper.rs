//! Periodic closing of abandoned transfer sessions.
//!
//! A client that dies mid-upload or mid-download leaves its session open.
//! This job closes sessions idle longer than the configured timeout so the
//! next client can start afresh.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::service::RenderService;

/// Run the session reaper loop until `cancel` is triggered.
///
/// Ticks while a call holds the service are skipped; an active call means
/// the sessions are not idle.
pub async fn run(service: Arc<Mutex<RenderService>>, every: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = every.as_secs(), "Session reaper started");

    let mut interval = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Session reaper stopping");
                break;
            }
            _ = interval.tick() => {
                let Ok(mut guard) = service.try_lock() else {
                    tracing::debug!("Session reaper: service busy, skipping");
                    continue;
                };
                let closed = guard.blob_mut().close_stale();
                if closed > 0 {
                    tracing::info!(closed, "Session reaper: closed idle sessions");
                }
            }
        }
    }
}
