//! Chunked transfer of the scene file (upload) and of render artifacts
//! (download) over the RPC surface.
//!
//! The channel holds at most one upload and one download session. An upload
//! that has been idle longer than the configured timeout is considered
//! abandoned: a new `newfile` replaces it, and the session reaper closes it.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tempfile::TempPath;
use tessera_core::error::CoreError;
use tessera_core::hashing::StreamDigest;
use tessera_core::protocol::{ResultHandle, UploadSummary};
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use uuid::Uuid;

/// Suffix of received scene files.
const SCENE_SUFFIX: &str = ".blend";

struct UploadSession {
    id: Uuid,
    path: TempPath,
    writer: BufWriter<File>,
    bytes_written: u64,
    digest: StreamDigest,
    last_activity: Instant,
}

struct DownloadSession {
    path: PathBuf,
    file: File,
    last_activity: Instant,
}

/// Upload and download sessions of one render server.
pub struct BlobChannel {
    scratch_dir: PathBuf,
    buffer_size: usize,
    idle_timeout: Duration,
    upload: Option<UploadSession>,
    /// Last completed upload; deleted when replaced.
    scene: Option<TempPath>,
    download: Option<DownloadSession>,
}

impl BlobChannel {
    pub fn new(scratch_dir: impl Into<PathBuf>, buffer_size: usize, idle_timeout: Duration) -> Self {
        Self {
            scratch_dir: scratch_dir.into(),
            buffer_size: buffer_size.max(1),
            idle_timeout,
            upload: None,
            scene: None,
            download: None,
        }
    }

    /// Path of the most recently completed upload.
    pub fn scene_path(&self) -> Option<&Path> {
        self.scene.as_deref()
    }

    pub fn is_uploading(&self) -> bool {
        self.upload.is_some()
    }

    pub fn is_downloading(&self) -> bool {
        self.download.is_some()
    }

    /// Open a fresh upload session backed by a new temporary file.
    ///
    /// Fails with [`CoreError::InvalidState`] while another upload is still
    /// active; an idle one is discarded and replaced.
    pub async fn newfile(&mut self) -> Result<Uuid, CoreError> {
        if let Some(upload) = &self.upload {
            if upload.last_activity.elapsed() < self.idle_timeout {
                return Err(CoreError::InvalidState(format!(
                    "Upload {} is still in progress",
                    upload.id
                )));
            }
            tracing::warn!(session_id = %upload.id, "Replacing idle upload session");
            self.upload = None;
        }

        tokio::fs::create_dir_all(&self.scratch_dir)
            .await
            .map_err(|e| CoreError::resource("Cannot create scratch directory", e))?;

        let temp = tempfile::Builder::new()
            .prefix("scene-")
            .suffix(SCENE_SUFFIX)
            .tempfile_in(&self.scratch_dir)
            .map_err(|e| CoreError::resource("Cannot create scene file", e))?;
        let (file, path) = temp.into_parts();

        let id = Uuid::new_v4();
        self.upload = Some(UploadSession {
            id,
            path,
            writer: BufWriter::with_capacity(self.buffer_size, File::from_std(file)),
            bytes_written: 0,
            digest: StreamDigest::new(),
            last_activity: Instant::now(),
        });

        tracing::info!(session_id = %id, "Upload session opened");
        Ok(id)
    }

    /// Append a chunk to the open upload; returns the running byte count.
    ///
    /// A write failure discards the session.
    pub async fn put(&mut self, data: &[u8]) -> Result<u64, CoreError> {
        let upload = self
            .upload
            .as_mut()
            .ok_or_else(|| CoreError::InvalidState("No upload in progress".to_string()))?;

        if let Err(e) = upload.writer.write_all(data).await {
            self.upload = None;
            return Err(CoreError::resource("Cannot write scene file", e));
        }

        upload.digest.update(data);
        upload.bytes_written += data.len() as u64;
        upload.last_activity = Instant::now();
        Ok(upload.bytes_written)
    }

    /// Flush and close the open upload. The file becomes the current scene.
    pub async fn endfile(&mut self) -> Result<UploadSummary, CoreError> {
        let mut upload = self
            .upload
            .take()
            .ok_or_else(|| CoreError::InvalidState("No upload in progress".to_string()))?;

        upload
            .writer
            .flush()
            .await
            .map_err(|e| CoreError::resource("Cannot flush scene file", e))?;
        drop(upload.writer);

        let summary = UploadSummary {
            bytes_written: upload.bytes_written,
            sha256: upload.digest.finish(),
        };

        tracing::info!(
            session_id = %upload.id,
            bytes = summary.bytes_written,
            path = %upload.path.display(),
            "Upload session closed",
        );
        self.scene = Some(upload.path);
        Ok(summary)
    }

    /// Open `path` for chunked download, replacing any open download.
    pub async fn open_download(&mut self, path: &Path) -> Result<ResultHandle, CoreError> {
        self.download = None;

        let file = File::open(path)
            .await
            .map_err(|e| CoreError::resource(&format!("Cannot open {}", path.display()), e))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| CoreError::resource(&format!("Cannot stat {}", path.display()), e))?
            .len();

        self.download = Some(DownloadSession {
            path: path.to_path_buf(),
            file,
            last_activity: Instant::now(),
        });

        Ok(ResultHandle {
            name: path.display().to_string(),
            size,
        })
    }

    /// Read the next chunk of at most `buffer_size` bytes.
    ///
    /// An empty chunk marks the end of the artifact and closes the download;
    /// calling again afterwards fails with [`CoreError::InvalidState`].
    pub async fn get(&mut self) -> Result<Vec<u8>, CoreError> {
        let download = self
            .download
            .as_mut()
            .ok_or_else(|| CoreError::InvalidState("No download in progress".to_string()))?;

        let mut chunk = Vec::with_capacity(self.buffer_size);
        let read = (&mut download.file)
            .take(self.buffer_size as u64)
            .read_to_end(&mut chunk)
            .await;

        match read {
            Err(e) => {
                self.download = None;
                Err(CoreError::resource("Cannot read result file", e))
            }
            Ok(0) => {
                tracing::debug!(path = %download.path.display(), "Download complete");
                self.download = None;
                Ok(chunk)
            }
            Ok(_) => {
                download.last_activity = Instant::now();
                Ok(chunk)
            }
        }
    }

    /// Close both sessions. Returns true if anything was open.
    pub fn force_close(&mut self) -> bool {
        let had_any = self.upload.is_some() || self.download.is_some();
        if let Some(upload) = self.upload.take() {
            tracing::info!(session_id = %upload.id, "Upload session force-closed");
        }
        self.download = None;
        had_any
    }

    /// Close sessions idle for at least the idle timeout. Returns how many
    /// were closed.
    pub fn close_stale(&mut self) -> usize {
        let timeout = self.idle_timeout;
        let mut closed = 0;

        if let Some(upload) = &self.upload {
            if upload.last_activity.elapsed() >= timeout {
                tracing::warn!(session_id = %upload.id, "Closing idle upload session");
                self.upload = None;
                closed += 1;
            }
        }
        if let Some(download) = &self.download {
            if download.last_activity.elapsed() >= timeout {
                tracing::warn!(path = %download.path.display(), "Closing idle download session");
                self.download = None;
                closed += 1;
            }
        }

        closed
    }
}
