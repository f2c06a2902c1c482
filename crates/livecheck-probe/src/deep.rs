//! Stage 2: deep media inspection of stage 1 survivors.

use std::time::Duration;

use futures::stream::{self, StreamExt, TryStreamExt};
use livecheck_core::{DeepProbeConfig, DeepProbeResult, StageFailure};

use crate::error::ProbeError;
use crate::inspect::{summarize, MediaInspector};

pub struct DeepProber<I> {
    inspector: I,
    concurrency: usize,
    timeout: Duration,
}

impl<I: MediaInspector> DeepProber<I> {
    pub fn new(inspector: I, config: &DeepProbeConfig) -> Self {
        Self {
            inspector,
            concurrency: config.concurrency.max(1),
            timeout: Duration::from_secs(config.timeout_secs),
        }
    }

    /// Inspects each URL, returning one [`DeepProbeResult`] per URL in
    /// completion order. Per-URL failures are recorded on the result.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the inspection capability is
    /// missing, either up front or discovered mid-run.
    pub async fn run(&self, urls: &[String]) -> Result<Vec<DeepProbeResult>, ProbeError> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }
        self.inspector.ensure_available().await?;
        tracing::info!(
            total = urls.len(),
            concurrency = self.concurrency,
            timeout_secs = self.timeout.as_secs(),
            "stage 2 starting"
        );

        let results: Vec<DeepProbeResult> = stream::iter(urls)
            .map(|url| self.probe_one(url))
            .buffer_unordered(self.concurrency)
            .try_collect()
            .await?;

        let valid = results.iter().filter(|r| r.is_valid()).count();
        tracing::info!(
            total = results.len(),
            valid,
            invalid = results.len() - valid,
            "stage 2 complete"
        );
        Ok(results)
    }

    async fn probe_one(&self, url: &str) -> Result<DeepProbeResult, ProbeError> {
        let outcome = self
            .inspector
            .inspect(url, self.timeout)
            .await
            .and_then(|info| summarize(url, &info));
        match outcome {
            Ok(result) => {
                tracing::debug!(url, summary = %result.video_summary(), "media confirmed");
                Ok(result)
            }
            Err(e) if e.is_configuration() => Err(e),
            Err(e) => {
                tracing::warn!(url, error = %e, "deep probe failed");
                Ok(DeepProbeResult {
                    url: url.to_owned(),
                    error: Some(StageFailure::new(e.kind(), e.to_string())),
                    ..DeepProbeResult::default()
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use livecheck_core::FailureKind;

    use super::*;
    use crate::error::ToolError;
    use crate::inspect::{parse_media_info, MediaInfo};

    enum Canned {
        Json(&'static str),
        Timeout,
        Missing,
    }

    struct CannedInspector {
        available: bool,
        by_url: HashMap<&'static str, Canned>,
    }

    #[async_trait]
    impl MediaInspector for CannedInspector {
        async fn ensure_available(&self) -> Result<(), ProbeError> {
            if self.available {
                Ok(())
            } else {
                Err(ProbeError::CapabilityMissing("ffprobe not found".to_owned()))
            }
        }

        async fn inspect(&self, url: &str, _timeout: Duration) -> Result<MediaInfo, ProbeError> {
            match self.by_url.get(url) {
                Some(Canned::Json(json)) => parse_media_info(url, json.as_bytes()),
                Some(Canned::Timeout) => Err(ToolError::Timeout {
                    program: "ffprobe".to_owned(),
                    secs: 20,
                }
                .into()),
                Some(Canned::Missing) => Err(ToolError::NotFound {
                    program: "ffprobe".to_owned(),
                }
                .into()),
                None => parse_media_info(url, b""),
            }
        }
    }

    const VIDEO: &str = r#"{"streams": [{"codec_type": "video", "codec_name": "h264"}]}"#;
    const AUDIO: &str = r#"{"streams": [{"codec_type": "audio", "codec_name": "aac"}]}"#;

    fn urls(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| (*s).to_owned()).collect()
    }

    #[tokio::test]
    async fn per_url_failures_are_recorded_not_raised() {
        let inspector = CannedInspector {
            available: true,
            by_url: HashMap::from([
                ("video", Canned::Json(VIDEO)),
                ("audio", Canned::Json(AUDIO)),
                ("slow", Canned::Timeout),
            ]),
        };
        let prober = DeepProber::new(inspector, &DeepProbeConfig::default());
        let results = prober
            .run(&urls(&["video", "audio", "slow", "silent"]))
            .await
            .unwrap();
        assert_eq!(results.len(), 4);

        let by_url: HashMap<&str, &DeepProbeResult> =
            results.iter().map(|r| (r.url.as_str(), r)).collect();
        assert!(by_url["video"].is_valid());
        assert_eq!(
            by_url["audio"].error.as_ref().map(|e| e.kind),
            Some(FailureKind::Parse)
        );
        assert_eq!(
            by_url["slow"].error.as_ref().map(|e| e.kind),
            Some(FailureKind::ToolInvocation)
        );
        assert_eq!(
            by_url["silent"].error.as_ref().map(|e| e.kind),
            Some(FailureKind::Parse)
        );
    }

    #[tokio::test]
    async fn unavailable_capability_aborts() {
        let inspector = CannedInspector {
            available: false,
            by_url: HashMap::new(),
        };
        let err = DeepProber::new(inspector, &DeepProbeConfig::default())
            .run(&urls(&["video"]))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn binary_vanishing_mid_run_aborts() {
        let inspector = CannedInspector {
            available: true,
            by_url: HashMap::from([("video", Canned::Json(VIDEO)), ("gone", Canned::Missing)]),
        };
        let err = DeepProber::new(inspector, &DeepProbeConfig::default())
            .run(&urls(&["video", "gone"]))
            .await
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[tokio::test]
    async fn empty_input_skips_availability_check() {
        let inspector = CannedInspector {
            available: false,
            by_url: HashMap::new(),
        };
        let results = DeepProber::new(inspector, &DeepProbeConfig::default())
            .run(&[])
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
