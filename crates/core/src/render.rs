//! The external render capability and the override/restore discipline
//! around it.
//!
//! A [`RenderEngine`] keeps per-scene [`RenderSettings`] that persist
//! between calls. Rendering a single frame or a single tile means
//! temporarily overriding some of those settings; [`render_with_overrides`]
//! guarantees the previous settings are put back whether the render
//! succeeds or fails, and only then reports the outcome.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::partition::{CameraWindow, Tile};
use crate::types::{FrameNumber, ImageFormat};

/// Identifies a scene loaded from a scene file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SceneHandle {
    pub file: PathBuf,
    pub scene: String,
}

/// Renderer settings that a single-frame or single-tile render overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderSettings {
    pub start_frame: FrameNumber,
    pub end_frame: FrameNumber,
    pub current_frame: FrameNumber,
    pub image_format: ImageFormat,
    /// Output path prefix; the engine appends the frame number and extension.
    pub output_path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub camera: CameraWindow,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            start_frame: 1,
            end_frame: 250,
            current_frame: 1,
            image_format: ImageFormat::Png,
            output_path: PathBuf::from("render_"),
            width: 1920,
            height: 1080,
            camera: CameraWindow::default(),
        }
    }
}

/// Errors raised by a render engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Scene {scene} not found in {file}")]
    SceneNotFound { file: String, scene: String },

    #[error("Render failed: {0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<EngineError> for CoreError {
    fn from(err: EngineError) -> Self {
        CoreError::Render(err.to_string())
    }
}

/// The render capability the farm drives.
#[async_trait]
pub trait RenderEngine: Send + Sync {
    /// Load `scene` from a scene file and return a handle to it.
    async fn load_scene(&mut self, file: &Path, scene: &str) -> Result<SceneHandle, EngineError>;

    /// Current settings of a loaded scene.
    async fn settings(&self, scene: &SceneHandle) -> Result<RenderSettings, EngineError>;

    /// Replace the settings of a loaded scene.
    async fn apply_settings(
        &mut self,
        scene: &SceneHandle,
        settings: &RenderSettings,
    ) -> Result<(), EngineError>;

    /// Render the scene with its current settings; returns the artifact path.
    async fn render(&mut self, scene: &SceneHandle) -> Result<PathBuf, EngineError>;
}

/// Render `scene` with settings derived from its current ones by
/// `overrides`, restoring the previous settings afterwards.
///
/// Restoration runs on every path. A failed render is reported even when
/// the restore also fails; a restore failure after a successful render is
/// itself reported as the error.
pub async fn render_with_overrides<F>(
    engine: &mut dyn RenderEngine,
    scene: &SceneHandle,
    overrides: F,
) -> Result<PathBuf, EngineError>
where
    F: FnOnce(&RenderSettings) -> RenderSettings + Send,
{
    let saved = engine.settings(scene).await?;
    let overridden = overrides(&saved);

    let outcome = match engine.apply_settings(scene, &overridden).await {
        Ok(()) => engine.render(scene).await,
        Err(e) => Err(e),
    };

    let restored = engine.apply_settings(scene, &saved).await;

    match (outcome, restored) {
        (Ok(artifact), Ok(())) => Ok(artifact),
        (Ok(_), Err(restore_err)) => Err(restore_err),
        (Err(render_err), _) => Err(render_err),
    }
}

/// Render one animation frame of `scene_name` into `output_dir`.
///
/// Frame range collapses to `frame`; image format and output path are
/// overridden for the duration of the call.
pub async fn render_frame(
    engine: &mut dyn RenderEngine,
    scene_file: &Path,
    scene_name: &str,
    frame: FrameNumber,
    image_format: ImageFormat,
    output_dir: &Path,
) -> Result<PathBuf, CoreError> {
    ensure_output_dir(output_dir).await?;
    let scene = engine.load_scene(scene_file, scene_name).await?;
    let output_path = output_dir.join("frame_");

    let artifact = render_with_overrides(engine, &scene, move |current| RenderSettings {
        start_frame: frame,
        end_frame: frame,
        current_frame: frame,
        image_format,
        output_path,
        ..current.clone()
    })
    .await?;

    Ok(artifact)
}

/// Render one tile of a partitioned still of `scene_name` into `output_dir`.
///
/// Besides frame range, format and output path, the resolution shrinks to
/// the tile's pixel size and the camera window is pointed at the tile.
pub async fn render_part(
    engine: &mut dyn RenderEngine,
    scene_file: &Path,
    scene_name: &str,
    tile: Tile,
    image_format: ImageFormat,
    output_dir: &Path,
) -> Result<PathBuf, CoreError> {
    ensure_output_dir(output_dir).await?;
    let scene = engine.load_scene(scene_file, scene_name).await?;
    let output_path = output_dir.join(format!("part_{:03}_", tile.index()));

    let artifact = render_with_overrides(engine, &scene, move |current| {
        let rect = tile.pixel_rect(current.width, current.height);
        RenderSettings {
            start_frame: current.current_frame,
            end_frame: current.current_frame,
            current_frame: current.current_frame,
            image_format,
            output_path,
            width: rect.width,
            height: rect.height,
            camera: tile.camera_window(),
        }
    })
    .await?;

    Ok(artifact)
}

async fn ensure_output_dir(dir: &Path) -> Result<(), CoreError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| CoreError::resource(&format!("Cannot create {}", dir.display()), e))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    /// In-memory engine that records the settings it rendered with.
    #[derive(Default)]
    struct RecordingEngine {
        scenes: HashMap<SceneHandle, RenderSettings>,
        rendered_with: Vec<RenderSettings>,
        fail_render: bool,
    }

    #[async_trait]
    impl RenderEngine for RecordingEngine {
        async fn load_scene(
            &mut self,
            file: &Path,
            scene: &str,
        ) -> Result<SceneHandle, EngineError> {
            let handle = SceneHandle {
                file: file.to_path_buf(),
                scene: scene.to_string(),
            };
            self.scenes.entry(handle.clone()).or_default();
            Ok(handle)
        }

        async fn settings(&self, scene: &SceneHandle) -> Result<RenderSettings, EngineError> {
            Ok(self.scenes[scene].clone())
        }

        async fn apply_settings(
            &mut self,
            scene: &SceneHandle,
            settings: &RenderSettings,
        ) -> Result<(), EngineError> {
            self.scenes.insert(scene.clone(), settings.clone());
            Ok(())
        }

        async fn render(&mut self, scene: &SceneHandle) -> Result<PathBuf, EngineError> {
            let settings = self.scenes[scene].clone();
            self.rendered_with.push(settings.clone());
            if self.fail_render {
                return Err(EngineError::Failed("out of memory".into()));
            }
            let mut artifact = settings.output_path.into_os_string();
            artifact.push(format!("{:04}.png", settings.current_frame));
            Ok(PathBuf::from(artifact))
        }
    }

    fn scene_handle(file: &Path) -> SceneHandle {
        SceneHandle {
            file: file.to_path_buf(),
            scene: "Scene".into(),
        }
    }

    #[tokio::test]
    async fn frame_render_overrides_then_restores() {
        let dir = tempfile::tempdir().unwrap();
        let scene_file = dir.path().join("shot.blend");
        let mut engine = RecordingEngine::default();

        let artifact = render_frame(
            &mut engine,
            &scene_file,
            "Scene",
            42,
            ImageFormat::Jpeg,
            dir.path(),
        )
        .await
        .unwrap();

        let used = &engine.rendered_with[0];
        assert_eq!((used.start_frame, used.end_frame, used.current_frame), (42, 42, 42));
        assert_eq!(used.image_format, ImageFormat::Jpeg);
        assert!(artifact.to_string_lossy().ends_with("frame_0042.png"));

        let after = &engine.scenes[&scene_handle(&scene_file)];
        assert_eq!(after, &RenderSettings::default());
    }

    #[tokio::test]
    async fn failed_render_still_restores_settings() {
        let dir = tempfile::tempdir().unwrap();
        let scene_file = dir.path().join("shot.blend");
        let mut engine = RecordingEngine {
            fail_render: true,
            ..Default::default()
        };

        let result = render_frame(
            &mut engine,
            &scene_file,
            "Scene",
            7,
            ImageFormat::Png,
            dir.path(),
        )
        .await;

        assert_matches!(result, Err(CoreError::Render(_)));
        let after = &engine.scenes[&scene_handle(&scene_file)];
        assert_eq!(after, &RenderSettings::default());
    }

    #[tokio::test]
    async fn part_render_shrinks_resolution_and_restores_it() {
        let dir = tempfile::tempdir().unwrap();
        let scene_file = dir.path().join("still.blend");
        let mut engine = RecordingEngine::default();
        let tile = Tile::new(3, 2).unwrap();

        render_part(
            &mut engine,
            &scene_file,
            "Scene",
            tile,
            ImageFormat::Png,
            dir.path(),
        )
        .await
        .unwrap();

        let used = &engine.rendered_with[0];
        assert_eq!((used.width, used.height), (960, 540));
        assert_eq!(used.camera, tile.camera_window());
        assert!(used.output_path.ends_with("part_003_"));

        let after = &engine.scenes[&scene_handle(&scene_file)];
        assert_eq!(after, &RenderSettings::default());
    }

    #[tokio::test]
    async fn failed_part_render_restores_every_override() {
        let dir = tempfile::tempdir().unwrap();
        let scene_file = dir.path().join("still.blend");
        let mut engine = RecordingEngine {
            fail_render: true,
            ..Default::default()
        };

        let result = render_part(
            &mut engine,
            &scene_file,
            "Scene",
            Tile::new(0, 4).unwrap(),
            ImageFormat::Tga,
            dir.path(),
        )
        .await;

        assert!(result.is_err());
        let after = &engine.scenes[&scene_handle(&scene_file)];
        assert_eq!(after, &RenderSettings::default());
    }
}
