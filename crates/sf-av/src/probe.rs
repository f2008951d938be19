//! Video probing.
//!
//! The [`Prober`] trait is the seam between pre-flight validation and the
//! tool that inspects the input. [`FfprobeProber`] shells out to
//! `ffprobe -v quiet -print_format json -show_format -show_streams` and keeps
//! only what validation needs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sf_core::{Error, Result};

use crate::command::ToolCommand;

const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Basic properties of a video file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub size_bytes: u64,
}

/// Something that can inspect a video file.
#[async_trait]
pub trait Prober: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    async fn probe(&self, path: &Path) -> Result<VideoInfo>;
}

/// A prober backed by the `ffprobe` CLI.
#[derive(Debug, Clone)]
pub struct FfprobeProber {
    /// Path to the ffprobe binary.
    ffprobe_path: PathBuf,
}

impl FfprobeProber {
    /// Create a new prober using the given ffprobe path.
    pub fn new(ffprobe_path: PathBuf) -> Self {
        Self { ffprobe_path }
    }
}

#[async_trait]
impl Prober for FfprobeProber {
    fn name(&self) -> &'static str {
        "ffprobe"
    }

    async fn probe(&self, path: &Path) -> Result<VideoInfo> {
        let output = ToolCommand::new(self.ffprobe_path.clone())
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path.to_string_lossy())
            .timeout(PROBE_TIMEOUT)
            .execute()
            .await?;

        let mut info = parse_ffprobe_json(&output.stdout)?;
        if info.size_bytes == 0 {
            info.size_bytes = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        }
        Ok(info)
    }
}

// ---------------------------------------------------------------------------
// JSON structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

/// Parse ffprobe's JSON into a [`VideoInfo`].
///
/// Uses the first video stream. Duration falls back from the container to
/// the stream; frame rate falls back from `r_frame_rate` to `avg_frame_rate`.
pub fn parse_ffprobe_json(json: &str) -> Result<VideoInfo> {
    let ff: FfprobeOutput = serde_json::from_str(json)
        .map_err(|e| Error::tool("ffprobe", format!("JSON parse error: {e}")))?;

    let video = ff
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| Error::tool("ffprobe", "no video stream found"))?;

    let duration_secs = ff
        .format
        .duration
        .as_deref()
        .or(video.duration.as_deref())
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let fps = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_rational)
        .or_else(|| video.avg_frame_rate.as_deref().and_then(parse_rational))
        .unwrap_or(0.0);

    Ok(VideoInfo {
        duration_secs,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        fps,
        size_bytes: ff
            .format
            .size
            .as_deref()
            .and_then(|s| s.parse().ok())
            .unwrap_or(0),
    })
}

/// Parse `"30000/1001"` or `"25"`. A zero denominator yields `None`.
fn parse_rational(s: &str) -> Option<f64> {
    match s.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                None
            } else {
                Some(num / den)
            }
        }
        None => s.trim().parse().ok(),
    }
}
