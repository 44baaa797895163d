//! [`RenderEngine`] backed by an external renderer process.
//!
//! Drives a Blender-compatible command line in background mode. Scene
//! settings live in memory on this side; each render spawns the renderer
//! with the current settings expressed as arguments plus a short Python
//! expression for the values the command line cannot set directly
//! (resolution and camera window).

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::process::Command;

use crate::render::{EngineError, RenderEngine, RenderSettings, SceneHandle};

/// How much renderer stderr to keep in an error message.
const STDERR_TAIL_BYTES: usize = 2048;

/// Render engine that shells out to a renderer executable.
pub struct CommandEngine {
    program: PathBuf,
    defaults: RenderSettings,
    scenes: HashMap<SceneHandle, RenderSettings>,
}

impl CommandEngine {
    /// Create an engine invoking `program`; newly loaded scenes start from
    /// `defaults`.
    pub fn new(program: impl Into<PathBuf>, defaults: RenderSettings) -> Self {
        Self {
            program: program.into(),
            defaults,
            scenes: HashMap::new(),
        }
    }
}

/// Command-line arguments for rendering `scene` with `settings`.
pub fn command_args(scene: &SceneHandle, settings: &RenderSettings) -> Vec<String> {
    let mut output = settings.output_path.clone().into_os_string();
    output.push("####");

    vec![
        "-b".into(),
        scene.file.display().to_string(),
        "-S".into(),
        scene.scene.clone(),
        "--python-expr".into(),
        python_overrides(settings),
        "-o".into(),
        output.to_string_lossy().into_owned(),
        "-F".into(),
        settings.image_format.renderer_name().into(),
        "-x".into(),
        "1".into(),
        "-s".into(),
        settings.start_frame.to_string(),
        "-e".into(),
        settings.end_frame.to_string(),
        "-a".into(),
    ]
}

/// Path of the artifact the renderer writes for the current frame.
pub fn expected_artifact(settings: &RenderSettings) -> PathBuf {
    let mut path = settings.output_path.clone().into_os_string();
    path.push(format!(
        "{:04}.{}",
        settings.current_frame,
        settings.image_format.extension()
    ));
    PathBuf::from(path)
}

fn python_overrides(settings: &RenderSettings) -> String {
    let mut expr = format!(
        "import bpy; s = bpy.context.scene; \
         s.render.resolution_x = {}; s.render.resolution_y = {}; \
         s.render.resolution_percentage = 100; s.frame_current = {}",
        settings.width, settings.height, settings.current_frame
    );
    let camera = settings.camera;
    if camera.zoom != 1 || camera.shift_x != 0.0 || camera.shift_y != 0.0 {
        expr.push_str(&format!(
            "; c = s.camera.data; c.lens = c.lens * {}; c.shift_x = {}; c.shift_y = {}",
            camera.zoom, camera.shift_x, camera.shift_y
        ));
    }
    expr
}

#[async_trait]
impl RenderEngine for CommandEngine {
    async fn load_scene(&mut self, file: &Path, scene: &str) -> Result<SceneHandle, EngineError> {
        if tokio::fs::metadata(file).await.is_err() {
            return Err(EngineError::SceneNotFound {
                file: file.display().to_string(),
                scene: scene.to_string(),
            });
        }

        let handle = SceneHandle {
            file: file.to_path_buf(),
            scene: scene.to_string(),
        };
        self.scenes
            .entry(handle.clone())
            .or_insert_with(|| self.defaults.clone());
        Ok(handle)
    }

    async fn settings(&self, scene: &SceneHandle) -> Result<RenderSettings, EngineError> {
        self.scenes
            .get(scene)
            .cloned()
            .ok_or_else(|| EngineError::SceneNotFound {
                file: scene.file.display().to_string(),
                scene: scene.scene.clone(),
            })
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
        let settings = self.settings(scene).await?;
        let args = command_args(scene, &settings);

        let output = Command::new(&self.program)
            .args(&args)
            .kill_on_drop(true)
            .output()
            .await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let tail_start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
            let tail = stderr.get(tail_start..).unwrap_or(&stderr);
            return Err(EngineError::Failed(format!(
                "{} exited with {}: {}",
                self.program.display(),
                output.status.code().unwrap_or(-1),
                tail.trim(),
            )));
        }

        let artifact = expected_artifact(&settings);
        if tokio::fs::metadata(&artifact).await.is_err() {
            return Err(EngineError::Failed(format!(
                "renderer produced no output at {}",
                artifact.display()
            )));
        }

        Ok(artifact)
    }
}
