//! Helpers for driving a real render server from client tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tessera_core::admission::AllowedNetworks;
use tessera_core::render::{EngineError, RenderEngine, RenderSettings, SceneHandle};
use tessera_server::admission::AdmissionListener;
use tessera_server::blob::BlobChannel;
use tessera_server::router::build_app_router;
use tessera_server::service::RenderService;
use tessera_server::state::AppState;
use tokio_util::sync::CancellationToken;

/// Engine whose artifact content names the frame or tile it rendered.
pub struct LabelEngine {
    settings: RenderSettings,
    failing_frames: HashSet<i32>,
    delay: Duration,
}

impl LabelEngine {
    pub fn new() -> Self {
        Self {
            settings: RenderSettings {
                width: 64,
                height: 64,
                ..RenderSettings::default()
            },
            failing_frames: HashSet::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn failing_on(mut self, frames: impl IntoIterator<Item = i32>) -> Self {
        self.failing_frames.extend(frames);
        self
    }

    /// Hold the service lock for `delay` on every render.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl RenderEngine for LabelEngine {
    async fn load_scene(&mut self, file: &Path, scene: &str) -> Result<SceneHandle, EngineError> {
        Ok(SceneHandle {
            file: file.to_path_buf(),
            scene: scene.to_string(),
        })
    }

    async fn settings(&self, _scene: &SceneHandle) -> Result<RenderSettings, EngineError> {
        Ok(self.settings.clone())
    }

    async fn apply_settings(
        &mut self,
        _scene: &SceneHandle,
        settings: &RenderSettings,
    ) -> Result<(), EngineError> {
        self.settings = settings.clone();
        Ok(())
    }

    async fn render(&mut self, _scene: &SceneHandle) -> Result<PathBuf, EngineError> {
        tokio::time::sleep(self.delay).await;
        let frame = self.settings.current_frame;
        if self.failing_frames.contains(&frame) {
            return Err(EngineError::Failed(format!("frame {frame} failed")));
        }
        let path = PathBuf::from(format!(
            "{}{frame:04}.{}",
            self.settings.output_path.display(),
            self.settings.image_format.extension()
        ));
        let body = format!("{} {}x{}", path.display(), self.settings.width, self.settings.height);
        std::fs::write(&path, body)?;
        Ok(path)
    }
}

/// A render server running on an ephemeral loopback port.
pub struct TestServer {
    pub url: String,
    pub shutdown: CancellationToken,
    _dir: tempfile::TempDir,
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

pub async fn spawn_server(engine: LabelEngine) -> TestServer {
    let dir = tempfile::tempdir().unwrap();
    let shutdown = CancellationToken::new();
    let blob = BlobChannel::new(dir.path().join("uploads"), 16, Duration::from_secs(60));
    let service = RenderService::new(
        Box::new(engine),
        blob,
        dir.path().join("renders"),
        shutdown.clone(),
    );
    let state = AppState::new(service, shutdown.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr: SocketAddr = listener.local_addr().unwrap();
    let listener = AdmissionListener::new(
        listener,
        IpAddr::V4(Ipv4Addr::LOCALHOST),
        Arc::new(AllowedNetworks::default()),
    );
    let app = build_app_router(state, 1024 * 1024);

    let token = shutdown.clone();
    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(token.cancelled_owned())
            .await
            .unwrap();
    });

    TestServer {
        url: format!("http://{addr}"),
        shutdown,
        _dir: dir,
    }
}
