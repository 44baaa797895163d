use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Frame numbers follow the renderer's signed frame counter.
pub type FrameNumber = i32;

/// One unit of renderable work.
///
/// A job has no identity beyond its value; the same frame may sit in the
/// queue again after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Job {
    /// A single animation frame.
    Frame { frame: FrameNumber },
    /// One tile of a still split into a `count x count` grid.
    Part { index: u32, count: u32 },
}

impl Job {
    pub fn frame(frame: FrameNumber) -> Self {
        Self::Frame { frame }
    }

    pub fn part(index: u32, count: u32) -> Self {
        Self::Part { index, count }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Job::Frame { frame } => write!(f, "frame {frame}"),
            Job::Part { index, count } => write!(f, "part {index}/{}", count * count),
        }
    }
}

/// Output image formats understood by the render engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    #[serde(alias = "jpg")]
    Jpeg,
    #[serde(alias = "targa")]
    Tga,
    #[serde(alias = "tif")]
    Tiff,
    Bmp,
    #[serde(alias = "openexr", alias = "open_exr")]
    Exr,
}

impl ImageFormat {
    /// File extension the renderer appends to artifacts of this format.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Tga => "tga",
            ImageFormat::Tiff => "tif",
            ImageFormat::Bmp => "bmp",
            ImageFormat::Exr => "exr",
        }
    }

    /// Format identifier on the renderer command line.
    pub fn renderer_name(&self) -> &'static str {
        match self {
            ImageFormat::Png => "PNG",
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Tga => "TGA",
            ImageFormat::Tiff => "TIFF",
            ImageFormat::Bmp => "BMP",
            ImageFormat::Exr => "OPEN_EXR",
        }
    }
}

impl FromStr for ImageFormat {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "tga" | "targa" => Ok(ImageFormat::Tga),
            "tif" | "tiff" => Ok(ImageFormat::Tiff),
            "bmp" => Ok(ImageFormat::Bmp),
            "exr" | "openexr" | "open_exr" => Ok(ImageFormat::Exr),
            other => Err(CoreError::Validation(format!(
                "Unknown image format \"{other}\""
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_serializes_with_kind_tag() {
        let json = serde_json::to_value(Job::part(3, 2)).unwrap();
        assert_eq!(json["kind"], "part");
        assert_eq!(json["index"], 3);
        assert_eq!(json["count"], 2);

        let back: Job = serde_json::from_value(json).unwrap();
        assert_eq!(back, Job::part(3, 2));
    }

    #[test]
    fn job_display() {
        assert_eq!(Job::frame(12).to_string(), "frame 12");
        assert_eq!(Job::part(1, 2).to_string(), "part 1/4");
    }

    #[test]
    fn image_format_parses_aliases() {
        assert_eq!("JPG".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);
        assert_eq!(" png ".parse::<ImageFormat>().unwrap(), ImageFormat::Png);
        assert_eq!("open_exr".parse::<ImageFormat>().unwrap(), ImageFormat::Exr);
        assert!("gif".parse::<ImageFormat>().is_err());
    }

    #[test]
    fn image_format_wire_accepts_same_aliases_as_parsing() {
        for (alias, format) in [
            ("jpg", ImageFormat::Jpeg),
            ("targa", ImageFormat::Tga),
            ("tif", ImageFormat::Tiff),
            ("openexr", ImageFormat::Exr),
            ("open_exr", ImageFormat::Exr),
        ] {
            let from_wire: ImageFormat = serde_json::from_value(serde_json::json!(alias)).unwrap();
            assert_eq!(from_wire, format);
            assert_eq!(alias.parse::<ImageFormat>().unwrap(), format);
        }
    }

    #[test]
    fn image_format_wire_name_is_lowercase() {
        let json = serde_json::to_string(&ImageFormat::Tiff).unwrap();
        assert_eq!(json, "\"tiff\"");
    }
}
