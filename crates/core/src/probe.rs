//! Media type sniffing and image probing.
//!
//! Image decoding is delegated to external tools: `ffprobe` for every
//! container it understands and `webpmux` for WEBP.

#![allow(missing_docs)]

use std::path::PathBuf;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use seventv_common::{AppError, AppResult, ObjectId};
use tokio::process::Command;
use tracing::debug;

static WEBP_CANVAS_REGEX: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"Canvas size:\s*(\d+)\s*x\s*(\d+)").unwrap()
});

static WEBP_FRAMES_REGEX: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"Number of frames:\s*(\d+)").unwrap()
});

/// Accepted upload containers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Avi,
    Avif,
    Flv,
    Mp4,
    Webm,
    Gif,
    Jpeg,
    Png,
    Tiff,
    Webp,
}

impl MediaKind {
    /// Detect the container from magic bytes.
    #[must_use]
    pub fn detect(data: &[u8]) -> Option<Self> {
        let at = |start: usize, magic: &[u8]| data.get(start..start + magic.len()) == Some(magic);

        if at(0, b"RIFF") && at(8, b"WEBP") {
            Some(Self::Webp)
        } else if at(0, b"RIFF") && at(8, b"AVI ") {
            Some(Self::Avi)
        } else if at(4, b"ftypavif") || at(4, b"ftypavis") {
            Some(Self::Avif)
        } else if at(4, b"ftyp") {
            Some(Self::Mp4)
        } else if at(0, b"FLV") {
            Some(Self::Flv)
        } else if at(0, &[0x1A, 0x45, 0xDF, 0xA3]) {
            Some(Self::Webm)
        } else if at(0, b"GIF87a") || at(0, b"GIF89a") {
            Some(Self::Gif)
        } else if at(0, &[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if at(0, &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]) {
            Some(Self::Png)
        } else if at(0, b"II*\0") || at(0, b"MM\0*") {
            Some(Self::Tiff)
        } else {
            None
        }
    }

    /// File extension used for the stored input.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Avi => "avi",
            Self::Avif => "avif",
            Self::Flv => "flv",
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
            Self::Gif => "gif",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::Tiff => "tiff",
            Self::Webp => "webp",
        }
    }

    /// MIME type.
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Avi => "video/x-msvideo",
            Self::Avif => "image/avif",
            Self::Flv => "video/x-flv",
            Self::Mp4 => "video/mp4",
            Self::Webm => "video/webm",
            Self::Gif => "image/gif",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Tiff => "image/tiff",
            Self::Webp => "image/webp",
        }
    }

    /// Whether profile pictures may use this container.
    #[must_use]
    pub const fn is_picture(self) -> bool {
        matches!(
            self,
            Self::Avif | Self::Webp | Self::Gif | Self::Png | Self::Jpeg
        )
    }
}

/// Whether a PNG carries an animation control chunk (APNG).
#[must_use]
pub fn is_animated_png(data: &[u8]) -> bool {
    // acTL must come before the first IDAT
    let Some(idat) = data.windows(4).position(|w| w == b"IDAT") else {
        return false;
    };
    data[..idat].windows(4).any(|w| w == b"acTL")
}

/// Probed size of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaMetrics {
    pub width: i32,
    pub height: i32,
    pub frame_count: i32,
}

/// Reads dimensions and frame count of an upload.
#[async_trait]
pub trait MediaProbe: Send + Sync {
    async fn probe(&self, kind: MediaKind, data: &[u8]) -> AppResult<MediaMetrics>;
}

/// Probe that shells out to `ffprobe` and `webpmux`.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    ffprobe: String,
    webpmux: String,
    scratch: PathBuf,
}

impl Default for CommandProbe {
    fn default() -> Self {
        Self {
            ffprobe: "ffprobe".to_string(),
            webpmux: "webpmux".to_string(),
            scratch: std::env::temp_dir(),
        }
    }
}

impl CommandProbe {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn run(&self, program: &str, args: &[&str]) -> AppResult<String> {
        let output = Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| AppError::Internal(format!("failed to run {program}: {e}")))?;

        if !output.status.success() {
            return Err(AppError::invalid(format!(
                "Unable to read image: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl MediaProbe for CommandProbe {
    async fn probe(&self, kind: MediaKind, data: &[u8]) -> AppResult<MediaMetrics> {
        let path = self
            .scratch
            .join(format!("seventv-probe-{}.{}", ObjectId::new().to_hex(), kind.extension()));
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| AppError::Internal(format!("failed to write probe input: {e}")))?;
        let file = path.to_string_lossy().into_owned();

        let result = if kind == MediaKind::Webp {
            self.run(&self.webpmux, &["-info", &file])
                .await
                .and_then(|out| parse_webpmux_info(&out))
        } else {
            self.run(
                &self.ffprobe,
                &[
                    "-v",
                    "fatal",
                    "-select_streams",
                    "v:0",
                    "-count_frames",
                    "-show_entries",
                    "stream=width,height,nb_read_frames",
                    "-of",
                    "csv=p=0",
                    &file,
                ],
            )
            .await
            .and_then(|out| parse_ffprobe_csv(&out))
        };

        if let Err(e) = tokio::fs::remove_file(&path).await {
            debug!(error = %e, path = %file, "failed to remove probe input");
        }
        result
    }
}

/// Parse `width,height,nb_read_frames` as printed by `ffprobe -of csv=p=0`.
pub fn parse_ffprobe_csv(output: &str) -> AppResult<MediaMetrics> {
    let line = output.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let parts: Vec<i32> = line
        .trim()
        .split(',')
        .filter_map(|p| p.trim().parse().ok())
        .collect();

    match parts.as_slice() {
        [width, height, frames, ..] => Ok(MediaMetrics {
            width: *width,
            height: *height,
            frame_count: *frames,
        }),
        [width, height] => Ok(MediaMetrics {
            width: *width,
            height: *height,
            frame_count: 1,
        }),
        _ => Err(AppError::invalid("Unable to read image metadata")),
    }
}

/// Parse the output of `webpmux -info`.
pub fn parse_webpmux_info(output: &str) -> AppResult<MediaMetrics> {
    let canvas = WEBP_CANVAS_REGEX
        .captures(output)
        .ok_or_else(|| AppError::invalid("Unable to read image metadata"))?;
    let width = canvas[1].parse().unwrap_or(0);
    let height = canvas[2].parse().unwrap_or(0);
    let frame_count = WEBP_FRAMES_REGEX
        .captures(output)
        .and_then(|c| c[1].parse().ok())
        .unwrap_or(1);

    Ok(MediaMetrics {
        width,
        height,
        frame_count,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_by_magic() {
        assert_eq!(MediaKind::detect(b"RIFF\0\0\0\0WEBPVP8X"), Some(MediaKind::Webp));
        assert_eq!(MediaKind::detect(b"RIFF\0\0\0\0AVI LIST"), Some(MediaKind::Avi));
        assert_eq!(MediaKind::detect(b"\0\0\0\x1cftypavif"), Some(MediaKind::Avif));
        assert_eq!(MediaKind::detect(b"\0\0\0\x1cftypisom"), Some(MediaKind::Mp4));
        assert_eq!(MediaKind::detect(b"GIF89a\x01\x00"), Some(MediaKind::Gif));
        assert_eq!(MediaKind::detect(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(MediaKind::Jpeg));
        assert_eq!(MediaKind::detect(b"II*\0...."), Some(MediaKind::Tiff));
        assert_eq!(MediaKind::detect(b"%PDF-1.7"), None);
        assert_eq!(MediaKind::detect(b""), None);
    }

    #[test]
    fn test_apng_detection() {
        let mut apng = b"\x89PNG\r\n\x1a\n".to_vec();
        apng.extend_from_slice(b"....IHDR....acTL....IDAT");
        assert!(is_animated_png(&apng));

        let mut png = b"\x89PNG\r\n\x1a\n".to_vec();
        png.extend_from_slice(b"....IHDR....IDAT....acTL");
        assert!(!is_animated_png(&png));
    }

    #[test]
    fn test_parse_ffprobe() {
        let m = parse_ffprobe_csv("512,512,120\n").unwrap();
        assert_eq!(
            m,
            MediaMetrics {
                width: 512,
                height: 512,
                frame_count: 120
            }
        );
        assert!(parse_ffprobe_csv("").is_err());
    }

    #[test]
    fn test_parse_webpmux() {
        let out = "Canvas size: 512 x 384\nFeatures present: animation\nBackground color : 0xFFFFFFFF  Loop Count : 0\nNumber of frames: 750\n";
        let m = parse_webpmux_info(out).unwrap();
        assert_eq!((m.width, m.height, m.frame_count), (512, 384, 750));

        let still = parse_webpmux_info("Canvas size: 64 x 64\nFeatures present: no features\n").unwrap();
        assert_eq!(still.frame_count, 1);
    }
}
