use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::service::RenderService;

/// Shared application state available to all Axum handlers via `State<AppState>`.
#[derive(Clone)]
pub struct AppState {
    /// The render service; the lock serializes RPC calls.
    pub service: Arc<Mutex<RenderService>>,
    /// Cancelled when the server should shut down.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(service: RenderService, shutdown: CancellationToken) -> Self {
        Self {
            service: Arc::new(Mutex::new(service)),
            shutdown,
        }
    }
}
