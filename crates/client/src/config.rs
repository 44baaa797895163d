use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tessera_core::config::{env_or, env_parse, env_required, env_string, parse_flag, split_list, ConfigError};
use tessera_core::error::CoreError;
use tessera_core::partition::tiles;
use tessera_core::types::{FrameNumber, ImageFormat, Job};

/// Whether a run renders animation frames or tiles of a single still.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Anim,
    Still,
}

impl FromStr for RenderMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anim" | "animation" => Ok(Self::Anim),
            "still" | "image" => Ok(Self::Still),
            other => Err(format!("unknown render mode \"{other}\" (expected anim or still)")),
        }
    }
}

/// Inclusive frame range, written `start-end` or a single frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    pub start: FrameNumber,
    pub end: FrameNumber,
}

impl FromStr for FrameRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        // Split on the first '-' after position 0 so a negative start parses.
        let split = s.char_indices().skip(1).find(|&(_, c)| c == '-').map(|(i, _)| i);
        let (start, end) = match split {
            Some(i) => (&s[..i], &s[i + 1..]),
            None => (s, s),
        };
        let start: FrameNumber = start.trim().parse().map_err(|e| format!("bad start frame: {e}"))?;
        let end: FrameNumber = end.trim().parse().map_err(|e| format!("bad end frame: {e}"))?;
        if end < start {
            return Err(format!("end frame {end} is before start frame {start}"));
        }
        Ok(Self { start, end })
    }
}

/// Render client configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub scene_file: PathBuf,
    pub scene_name: String,
    pub mode: RenderMode,
    pub frames: FrameRange,
    /// Grid size for still renders; the still is split into `parts * parts` tiles.
    pub parts: u32,
    pub image_format: ImageFormat,
    pub output_dir: PathBuf,
    /// Statically configured server URIs, used alongside discovered ones.
    pub servers: Vec<String>,
    pub client_port: u16,
    /// How long to listen for announcements; zero disables discovery.
    pub discovery_window: Duration,
    pub local_worker: bool,
    pub buffer_size: usize,
    pub render_command: PathBuf,
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
}

impl ClientConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default    |
    /// |--------------------------------|------------|
    /// | `TESSERA_SCENE_FILE`           | (required) |
    /// | `TESSERA_SCENE_NAME`           | `Scene`    |
    /// | `TESSERA_MODE`                 | `anim`     |
    /// | `TESSERA_FRAMES`               | `1-1`      |
    /// | `TESSERA_PARTS`                | `2`        |
    /// | `TESSERA_IMAGE_FORMAT`         | `png`      |
    /// | `TESSERA_OUTPUT_DIR`           | `render`   |
    /// | `TESSERA_SERVERS`              | (empty)    |
    /// | `TESSERA_CLIENT_PORT`          | `8082`     |
    /// | `TESSERA_DISCOVERY_SECS`       | `3`        |
    /// | `TESSERA_LOCAL_WORKER`         | `true`     |
    /// | `TESSERA_BUFFER_SIZE`          | `65536`    |
    /// | `TESSERA_RENDER_COMMAND`       | `blender`  |
    /// | `TESSERA_CONNECT_TIMEOUT_SECS` | `5`        |
    /// | `TESSERA_POLL_MILLIS`          | `500`      |
    pub fn from_env() -> Result<Self, ConfigError> {
        let scene_file = PathBuf::from(env_required("TESSERA_SCENE_FILE")?);
        let scene_name = env_or("TESSERA_SCENE_NAME", "Scene");
        let mode = env_parse("TESSERA_MODE", RenderMode::Anim)?;
        let frames = env_parse("TESSERA_FRAMES", FrameRange { start: 1, end: 1 })?;
        let parts = env_parse("TESSERA_PARTS", 2u32)?;
        let image_format = env_parse("TESSERA_IMAGE_FORMAT", ImageFormat::Png)?;
        let output_dir = PathBuf::from(env_or("TESSERA_OUTPUT_DIR", "render"));
        let servers = split_list(&env_or("TESSERA_SERVERS", ""));
        let client_port = env_parse("TESSERA_CLIENT_PORT", 8082u16)?;
        let discovery_window = Duration::from_secs(env_parse("TESSERA_DISCOVERY_SECS", 3u64)?);
        let local_worker = match env_string("TESSERA_LOCAL_WORKER") {
            Some(raw) => parse_flag("TESSERA_LOCAL_WORKER", &raw)?,
            None => true,
        };
        let buffer_size = env_parse("TESSERA_BUFFER_SIZE", 65_536usize)?.max(1);
        let render_command = PathBuf::from(env_or("TESSERA_RENDER_COMMAND", "blender"));
        let connect_timeout =
            Duration::from_secs(env_parse("TESSERA_CONNECT_TIMEOUT_SECS", 5u64)?);
        let poll_interval = Duration::from_millis(env_parse("TESSERA_POLL_MILLIS", 500u64)?.max(1));

        Ok(Self {
            scene_file,
            scene_name,
            mode,
            frames,
            parts,
            image_format,
            output_dir,
            servers,
            client_port,
            discovery_window,
            local_worker,
            buffer_size,
            render_command,
            connect_timeout,
            poll_interval,
        })
    }

    /// The jobs of this run, in render order.
    pub fn jobs(&self) -> Result<Vec<Job>, CoreError> {
        match self.mode {
            RenderMode::Anim => Ok((self.frames.start..=self.frames.end).map(Job::frame).collect()),
            RenderMode::Still => Ok(tiles(self.parts)?
                .into_iter()
                .map(|tile| Job::part(tile.index(), tile.count()))
                .collect()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(mode: RenderMode, frames: &str, parts: u32) -> ClientConfig {
        ClientConfig {
            scene_file: PathBuf::from("scene.blend"),
            scene_name: "Scene".to_string(),
            mode,
            frames: frames.parse().unwrap(),
            parts,
            image_format: ImageFormat::Png,
            output_dir: PathBuf::from("render"),
            servers: Vec::new(),
            client_port: 8082,
            discovery_window: Duration::ZERO,
            local_worker: false,
            buffer_size: 1024,
            render_command: PathBuf::from("blender"),
            connect_timeout: Duration::from_secs(1),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[test]
    fn frame_ranges() {
        assert_eq!("1-250".parse::<FrameRange>().unwrap(), FrameRange { start: 1, end: 250 });
        assert_eq!("7".parse::<FrameRange>().unwrap(), FrameRange { start: 7, end: 7 });
        assert_eq!("-5-5".parse::<FrameRange>().unwrap(), FrameRange { start: -5, end: 5 });
        assert!("10-1".parse::<FrameRange>().is_err());
        assert!("a-b".parse::<FrameRange>().is_err());
    }

    #[test]
    fn modes() {
        assert_eq!("Still".parse::<RenderMode>().unwrap(), RenderMode::Still);
        assert!("movie".parse::<RenderMode>().is_err());
    }

    #[test]
    fn anim_jobs_cover_range() {
        let jobs = config(RenderMode::Anim, "3-5", 2).jobs().unwrap();
        assert_eq!(jobs, vec![Job::frame(3), Job::frame(4), Job::frame(5)]);
    }

    #[test]
    fn still_jobs_cover_grid() {
        let jobs = config(RenderMode::Still, "1", 3).jobs().unwrap();
        assert_eq!(jobs.len(), 9);
        assert_eq!(jobs[0], Job::part(0, 3));
        assert_eq!(jobs[8], Job::part(8, 3));
    }

    #[test]
    fn still_rejects_zero_parts() {
        assert!(config(RenderMode::Still, "1", 0).jobs().is_err());
    }
}
