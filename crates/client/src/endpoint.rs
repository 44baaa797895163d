//! Render endpoints a worker can be bound to.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tessera_core::error::CoreError;
use tessera_core::hashing::StreamDigest;
use tessera_core::partition::Tile;
use tessera_core::protocol::{RenderFrameRequest, RenderPartRequest, ResultHandle};
use tessera_core::render::{self, RenderEngine};
use tessera_core::types::{ImageFormat, Job};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::rpc::RenderClient;

/// What every endpoint renders: one scene of one scene file.
#[derive(Debug, Clone)]
pub struct SceneSpec {
    pub scene_file: PathBuf,
    pub scene_name: String,
    pub image_format: ImageFormat,
    /// Where finished artifacts land on this machine.
    pub output_dir: PathBuf,
    /// Upload chunk size.
    pub chunk_size: usize,
}

/// A place jobs can be rendered.
#[async_trait]
pub trait RenderEndpoint: Send {
    /// Human-readable name used in logs and statistics.
    fn label(&self) -> &str;

    /// Render `job` and return the local path of the artifact.
    async fn render(&mut self, job: &Job) -> Result<PathBuf, CoreError>;
}

/// A render server reached over RPC.
///
/// The scene file is uploaded once, before the first job; afterwards each
/// job is a render call followed by a chunked download of the artifact.
pub struct RemoteEndpoint {
    client: RenderClient,
    spec: Arc<SceneSpec>,
    uploaded: bool,
}

impl RemoteEndpoint {
    pub fn new(client: RenderClient, spec: Arc<SceneSpec>) -> Self {
        Self {
            client,
            spec,
            uploaded: false,
        }
    }

    async fn upload_scene(&self) -> Result<(), CoreError> {
        let path = &self.spec.scene_file;
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| CoreError::resource(&format!("Cannot open {}", path.display()), e))?;

        self.client.newfile().await?;

        let mut digest = StreamDigest::new();
        let mut sent = 0u64;
        loop {
            let mut chunk = Vec::with_capacity(self.spec.chunk_size);
            let n = (&mut file)
                .take(self.spec.chunk_size as u64)
                .read_to_end(&mut chunk)
                .await
                .map_err(|e| CoreError::resource(&format!("Cannot read {}", path.display()), e))?;
            if n == 0 {
                break;
            }
            digest.update(&chunk);
            sent += n as u64;
            self.client.put(chunk).await?;
        }

        let summary = self.client.endfile().await?;
        let expected = digest.finish();
        if summary.bytes_written != sent || summary.sha256 != expected {
            return Err(CoreError::Transport(format!(
                "Upload verification failed: sent {sent} bytes ({expected}), server stored {} ({})",
                summary.bytes_written, summary.sha256
            )));
        }

        tracing::info!(endpoint = %self.label(), bytes = sent, "Scene uploaded");
        Ok(())
    }

    async fn download(&self, handle: &ResultHandle) -> Result<PathBuf, CoreError> {
        let name = Path::new(&handle.name)
            .file_name()
            .ok_or_else(|| CoreError::Validation(format!("Bad artifact name {}", handle.name)))?;
        let target = self.spec.output_dir.join(name);

        tokio::fs::create_dir_all(&self.spec.output_dir)
            .await
            .map_err(|e| CoreError::resource("Cannot create output directory", e))?;
        let mut file = tokio::fs::File::create(&target)
            .await
            .map_err(|e| CoreError::resource(&format!("Cannot create {}", target.display()), e))?;

        let mut received = 0u64;
        loop {
            let chunk = self.client.get().await?;
            if chunk.is_empty() {
                break;
            }
            received += chunk.len() as u64;
            file.write_all(&chunk)
                .await
                .map_err(|e| CoreError::resource(&format!("Cannot write {}", target.display()), e))?;
        }
        file.flush()
            .await
            .map_err(|e| CoreError::resource(&format!("Cannot write {}", target.display()), e))?;

        if received != handle.size {
            return Err(CoreError::Transport(format!(
                "Short download of {}: {received} of {} bytes",
                handle.name, handle.size
            )));
        }
        Ok(target)
    }
}

#[async_trait]
impl RenderEndpoint for RemoteEndpoint {
    fn label(&self) -> &str {
        self.client.base_url()
    }

    async fn render(&mut self, job: &Job) -> Result<PathBuf, CoreError> {
        if !self.uploaded {
            self.upload_scene().await?;
            self.uploaded = true;
        }

        let (status, part_index) = match *job {
            Job::Frame { frame } => {
                let request = RenderFrameRequest {
                    scene: self.spec.scene_name.clone(),
                    frame,
                    image_format: self.spec.image_format,
                };
                (self.client.render_frame(&request).await?, None)
            }
            Job::Part { index, count } => {
                let request = RenderPartRequest {
                    scene: self.spec.scene_name.clone(),
                    part_index: index,
                    part_count: count,
                    image_format: self.spec.image_format,
                };
                (self.client.render_part(&request).await?, Some(index))
            }
        };

        // Another caller may have rendered in between; never download its artifact.
        let handle = self.client.get_result(part_index).await?;
        if handle.name != status.artifact {
            return Err(CoreError::Transport(format!(
                "Server opened {} instead of {} for {job}",
                handle.name, status.artifact
            )));
        }
        self.download(&handle).await
    }
}

/// Renders in-process with a local engine, writing straight to the output
/// directory.
pub struct LocalEndpoint {
    label: String,
    engine: Box<dyn RenderEngine>,
    spec: Arc<SceneSpec>,
}

impl LocalEndpoint {
    pub fn new(label: impl Into<String>, engine: Box<dyn RenderEngine>, spec: Arc<SceneSpec>) -> Self {
        Self {
            label: label.into(),
            engine,
            spec,
        }
    }
}

#[async_trait]
impl RenderEndpoint for LocalEndpoint {
    fn label(&self) -> &str {
        &self.label
    }

    async fn render(&mut self, job: &Job) -> Result<PathBuf, CoreError> {
        let spec = &self.spec;
        match *job {
            Job::Frame { frame } => {
                render::render_frame(
                    self.engine.as_mut(),
                    &spec.scene_file,
                    &spec.scene_name,
                    frame,
                    spec.image_format,
                    &spec.output_dir,
                )
                .await
            }
            Job::Part { index, count } => {
                let tile = Tile::new(index, count)?;
                render::render_part(
                    self.engine.as_mut(),
                    &spec.scene_file,
                    &spec.scene_name,
                    tile,
                    spec.image_format,
                    &spec.output_dir,
                )
                .await
            }
        }
    }
}
