//! Frame-grab capability. Each offset is a separate invocation.

use std::time::Duration;

use async_trait::async_trait;
use livecheck_probe::tool::{ensure_tool, run_tool};

use crate::error::FingerprintError;

#[async_trait]
pub trait FrameGrabber: Send + Sync {
    async fn ensure_available(&self) -> Result<(), FingerprintError> {
        Ok(())
    }

    /// Returns one encoded raster frame taken `offset_secs` into the stream.
    async fn grab(
        &self,
        url: &str,
        offset_secs: f64,
        timeout: Duration,
    ) -> Result<Vec<u8>, FingerprintError>;
}

/// [`FrameGrabber`] that pipes a single MJPEG frame out of `ffmpeg`.
#[derive(Debug, Clone)]
pub struct FfmpegFrameGrabber {
    bin: String,
}

impl FfmpegFrameGrabber {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }
}

fn grab_args(url: &str, offset_secs: f64) -> Vec<String> {
    let offset = offset_secs.to_string();
    [
        "-ss",
        offset.as_str(),
        "-i",
        url,
        "-frames:v",
        "1",
        "-f",
        "image2",
        "-vcodec",
        "mjpeg",
        "pipe:1",
        "-hide_banner",
        "-loglevel",
        "error",
    ]
    .iter()
    .map(|s| (*s).to_owned())
    .collect()
}

#[async_trait]
impl FrameGrabber for FfmpegFrameGrabber {
    async fn ensure_available(&self) -> Result<(), FingerprintError> {
        ensure_tool(&self.bin)
            .await
            .map_err(|e| FingerprintError::CapabilityMissing(e.to_string()))
    }

    async fn grab(
        &self,
        url: &str,
        offset_secs: f64,
        timeout: Duration,
    ) -> Result<Vec<u8>, FingerprintError> {
        let output = run_tool(&self.bin, &grab_args(url, offset_secs), timeout).await?;
        if output.stdout.is_empty() {
            return Err(FingerprintError::EmptyFrame { offset_secs });
        }
        Ok(output.stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeks_before_input() {
        let args = grab_args("http://s.test/live", 1.5);
        assert_eq!(&args[..4], ["-ss", "1.5", "-i", "http://s.test/live"]);
        assert!(args.contains(&"pipe:1".to_owned()));
    }

    #[test]
    fn whole_second_offsets_render_plainly() {
        assert_eq!(grab_args("u", 2.0)[1], "2");
    }

    #[tokio::test]
    async fn missing_ffmpeg_is_configuration_error() {
        let grabber = FfmpegFrameGrabber::new("livecheck-no-such-ffmpeg");
        let err = grabber.ensure_available().await.unwrap_err();
        assert!(err.is_configuration());

        let err = grabber
            .grab("http://s.test/live", 1.0, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
