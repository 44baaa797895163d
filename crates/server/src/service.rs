//! The render service behind the RPC surface.
//!
//! One [`RenderService`] exists per server process. Handlers reach it through
//! an async mutex, so calls are served strictly one at a time.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tessera_core::error::CoreError;
use tessera_core::partition::Tile;
use tessera_core::protocol::{
    RenderStatus, ResultHandle, UploadSummary, PING_REPLY, RENDER_FINISHED, STOP_REQUESTED,
};
use tessera_core::render::{self, RenderEngine};
use tessera_core::types::{FrameNumber, ImageFormat};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::blob::BlobChannel;

pub struct RenderService {
    engine: Box<dyn RenderEngine>,
    blob: BlobChannel,
    render_path: PathBuf,
    /// Artifact of the latest successful render.
    latest: Option<PathBuf>,
    /// Artifacts of successful part renders, by part index.
    parts: BTreeMap<u32, PathBuf>,
    shutdown: CancellationToken,
}

impl RenderService {
    pub fn new(
        engine: Box<dyn RenderEngine>,
        blob: BlobChannel,
        render_path: impl Into<PathBuf>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine,
            blob,
            render_path: render_path.into(),
            latest: None,
            parts: BTreeMap::new(),
            shutdown,
        }
    }

    pub fn blob(&self) -> &BlobChannel {
        &self.blob
    }

    pub fn blob_mut(&mut self) -> &mut BlobChannel {
        &mut self.blob
    }

    pub fn ping(&self) -> &'static str {
        PING_REPLY
    }

    pub async fn newfile(&mut self) -> Result<Uuid, CoreError> {
        self.blob.newfile().await
    }

    pub async fn put(&mut self, data: &[u8]) -> Result<u64, CoreError> {
        self.blob.put(data).await
    }

    pub async fn endfile(&mut self) -> Result<UploadSummary, CoreError> {
        self.blob.endfile().await
    }

    /// Render one frame of `scene` from the uploaded scene file.
    pub async fn render_frame(
        &mut self,
        scene: &str,
        frame: FrameNumber,
        image_format: ImageFormat,
    ) -> Result<RenderStatus, CoreError> {
        let scene_file = self.scene_file(scene)?;
        tracing::info!(scene, frame, format = ?image_format, "Rendering frame");

        let artifact = render::render_frame(
            self.engine.as_mut(),
            &scene_file,
            scene,
            frame,
            image_format,
            &self.render_path,
        )
        .await
        .inspect_err(|e| tracing::warn!(scene, frame, error = %e, "Frame render failed"))?;

        tracing::info!(scene, frame, artifact = %artifact.display(), "Frame rendered");
        Ok(self.finish(artifact))
    }

    /// Render tile `part_index` of a `part_count` x `part_count` grid.
    pub async fn render_part(
        &mut self,
        scene: &str,
        part_index: u32,
        part_count: u32,
        image_format: ImageFormat,
    ) -> Result<RenderStatus, CoreError> {
        let tile = Tile::new(part_index, part_count)?;
        let scene_file = self.scene_file(scene)?;
        tracing::info!(scene, part_index, part_count, "Rendering part");

        let artifact = render::render_part(
            self.engine.as_mut(),
            &scene_file,
            scene,
            tile,
            image_format,
            &self.render_path,
        )
        .await
        .inspect_err(|e| tracing::warn!(scene, part_index, error = %e, "Part render failed"))?;

        tracing::info!(scene, part_index, artifact = %artifact.display(), "Part rendered");
        self.parts.insert(part_index, artifact.clone());
        Ok(self.finish(artifact))
    }

    /// Open a rendered artifact for download: the latest one, or the one of
    /// a given part.
    pub async fn get_result(&mut self, part_index: Option<u32>) -> Result<ResultHandle, CoreError> {
        let path = match part_index {
            None => self.latest.clone().ok_or_else(|| {
                CoreError::InvalidState("Nothing has been rendered yet".to_string())
            })?,
            Some(index) => self.parts.get(&index).cloned().ok_or_else(|| {
                CoreError::InvalidState(format!("Part {index} has not been rendered"))
            })?,
        };
        self.blob.open_download(&path).await
    }

    pub async fn get(&mut self) -> Result<Vec<u8>, CoreError> {
        self.blob.get().await
    }

    /// Ask the server to shut down once the current call has been answered.
    pub fn stop(&self) -> &'static str {
        tracing::info!("Stop requested");
        self.shutdown.cancel();
        STOP_REQUESTED
    }

    fn scene_file(&self, scene: &str) -> Result<PathBuf, CoreError> {
        if scene.trim().is_empty() {
            return Err(CoreError::Validation("Scene name must not be empty".to_string()));
        }
        self.blob
            .scene_path()
            .map(|p| p.to_path_buf())
            .ok_or_else(|| CoreError::InvalidState("No scene file has been uploaded".to_string()))
    }

    fn finish(&mut self, artifact: PathBuf) -> RenderStatus {
        let status = RenderStatus {
            status: RENDER_FINISHED.to_string(),
            artifact: artifact.display().to_string(),
        };
        self.latest = Some(artifact);
        status
    }
}
