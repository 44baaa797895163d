//! Shared helpers for render server integration tests.

#![allow(dead_code)]

use std::collections::HashSet;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header::CONTENT_TYPE, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::Value;
use tessera_core::admission::AllowedNetworks;
use tessera_core::render::{EngineError, RenderEngine, RenderSettings, SceneHandle};
use tessera_server::admission::AdmissionListener;
use tessera_server::blob::BlobChannel;
use tessera_server::router::build_app_router;
use tessera_server::service::RenderService;
use tessera_server::state::AppState;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

pub const BUFFER_SIZE: usize = 4;
pub const MAX_CHUNK_BYTES: usize = 1024;

/// Render engine that writes `payload` as every artifact and fails on the
/// frames listed in `failing_frames`.
pub struct FakeEngine {
    settings: RenderSettings,
    payload: Vec<u8>,
    failing_frames: HashSet<i32>,
    pub renders: Arc<Mutex<Vec<RenderSettings>>>,
}

impl FakeEngine {
    pub fn new(payload: &[u8]) -> Self {
        Self {
            settings: RenderSettings {
                width: 640,
                height: 480,
                ..RenderSettings::default()
            },
            payload: payload.to_vec(),
            failing_frames: HashSet::new(),
            renders: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn failing_on(mut self, frame: i32) -> Self {
        self.failing_frames.insert(frame);
        self
    }
}

#[async_trait]
impl RenderEngine for FakeEngine {
    async fn load_scene(&mut self, file: &Path, scene: &str) -> Result<SceneHandle, EngineError> {
        if scene == "Missing" {
            return Err(EngineError::SceneNotFound {
                file: file.display().to_string(),
                scene: scene.to_string(),
            });
        }
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
        self.renders.lock().unwrap().push(self.settings.clone());
        if self.failing_frames.contains(&self.settings.current_frame) {
            return Err(EngineError::Failed(format!(
                "frame {} exploded",
                self.settings.current_frame
            )));
        }
        let path = PathBuf::from(format!(
            "{}{:04}.{}",
            self.settings.output_path.display(),
            self.settings.current_frame,
            self.settings.image_format.extension()
        ));
        std::fs::write(&path, &self.payload)?;
        Ok(path)
    }
}

/// Build app state around `engine` with scratch and render dirs in `dir`.
pub fn build_test_state(dir: &Path, engine: FakeEngine) -> AppState {
    let shutdown = CancellationToken::new();
    let blob = BlobChannel::new(dir.join("uploads"), BUFFER_SIZE, Duration::from_secs(60));
    let service = RenderService::new(Box::new(engine), blob, dir.join("renders"), shutdown.clone());
    AppState::new(service, shutdown)
}

/// Build the full application router the way `main.rs` does.
pub fn build_test_app(state: AppState) -> Router {
    build_app_router(state, MAX_CHUNK_BYTES)
}

/// Serve `state` on an ephemeral loopback port behind the admission filter.
pub async fn spawn_server(
    state: AppState,
    self_addr: IpAddr,
    networks: AllowedNetworks,
) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let listener = AdmissionListener::new(listener, self_addr, Arc::new(networks));
    let shutdown = state.shutdown.clone();
    let app = build_test_app(state);

    tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .unwrap();
    });

    addr
}

pub async fn post_empty(app: &Router, uri: &str) -> Response<Body> {
    let request = Request::post(uri).body(Body::empty()).unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_json(app: &Router, uri: &str, json: Value) -> Response<Body> {
    let request = Request::post(uri)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(json.to_string()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn post_bytes(app: &Router, uri: &str, bytes: &[u8]) -> Response<Body> {
    let request = Request::post(uri)
        .header(CONTENT_TYPE, "application/octet-stream")
        .body(Body::from(bytes.to_vec()))
        .unwrap();
    app.clone().oneshot(request).await.unwrap()
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response.into_body().collect().await.unwrap().to_bytes().to_vec()
}

pub async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}
