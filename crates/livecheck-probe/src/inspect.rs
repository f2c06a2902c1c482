//! Media-inspection capability used by stage 2.

use std::time::Duration;

use async_trait::async_trait;
use livecheck_core::DeepProbeResult;
use serde::Deserialize;

use crate::error::ProbeError;
use crate::tool::{ensure_tool, run_tool};

/// Structured track metadata as emitted by `ffprobe -print_format json`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MediaInfo {
    #[serde(default)]
    pub streams: Vec<TrackInfo>,
    #[serde(default)]
    pub format: FormatInfo,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct TrackInfo {
    pub codec_type: Option<String>,
    pub codec_name: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub avg_frame_rate: Option<String>,
    pub r_frame_rate: Option<String>,
}

/// ffprobe reports numeric format fields as strings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FormatInfo {
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
}

#[async_trait]
pub trait MediaInspector: Send + Sync {
    /// Checked once before a stage runs. An error here is a configuration
    /// failure, not a per-URL one.
    async fn ensure_available(&self) -> Result<(), ProbeError> {
        Ok(())
    }

    async fn inspect(&self, url: &str, timeout: Duration) -> Result<MediaInfo, ProbeError>;
}

/// [`MediaInspector`] backed by the `ffprobe` binary.
#[derive(Debug, Clone)]
pub struct FfprobeInspector {
    bin: String,
}

impl FfprobeInspector {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

#[async_trait]
impl MediaInspector for FfprobeInspector {
    async fn ensure_available(&self) -> Result<(), ProbeError> {
        ensure_tool(&self.bin)
            .await
            .map_err(|e| ProbeError::CapabilityMissing(e.to_string()))
    }

    async fn inspect(&self, url: &str, timeout: Duration) -> Result<MediaInfo, ProbeError> {
        let args: Vec<String> = [
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
            url,
        ]
        .iter()
        .map(|s| (*s).to_owned())
        .collect();
        let output = run_tool(&self.bin, &args, timeout).await?;
        parse_media_info(url, &output.stdout)
    }
}

/// Parses raw `ffprobe` JSON.
///
/// # Errors
///
/// Returns [`ProbeError::Parse`] for empty or malformed output.
pub fn parse_media_info(url: &str, stdout: &[u8]) -> Result<MediaInfo, ProbeError> {
    if stdout.iter().all(u8::is_ascii_whitespace) {
        return Err(ProbeError::Parse {
            url: url.to_owned(),
            reason: "no output".to_owned(),
        });
    }
    serde_json::from_slice(stdout).map_err(|e| ProbeError::Parse {
        url: url.to_owned(),
        reason: e.to_string(),
    })
}

/// Folds inspection output into a stage 2 result. The first video track
/// supplies codec, dimensions and frame rate.
///
/// # Errors
///
/// Returns [`ProbeError::NoVideo`] when no video track is present.
pub fn summarize(url: &str, info: &MediaInfo) -> Result<DeepProbeResult, ProbeError> {
    let has_audio = info
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    let video = info
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| ProbeError::NoVideo {
            url: url.to_owned(),
        })?;

    let frame_rate = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_frame_rate));

    Ok(DeepProbeResult {
        url: url.to_owned(),
        has_video: true,
        has_audio,
        codec: video.codec_name.clone(),
        width: video.width,
        height: video.height,
        frame_rate,
        duration_secs: info
            .format
            .duration
            .as_deref()
            .and_then(|d| d.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d >= 0.0),
        bit_rate: info
            .format
            .bit_rate
            .as_deref()
            .and_then(|b| b.trim().parse().ok()),
        error: None,
    })
}

/// `"num/den"` or a bare number. Zero denominators and zero rates are
/// treated as unknown.
fn parse_frame_rate(raw: &str) -> Option<f64> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
