use livecheck_core::FailureKind;
use livecheck_probe::ToolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("frame grab at {offset_secs}s returned no data")]
    EmptyFrame { offset_secs: f64 },

    #[error("failed to decode frame: {0}")]
    Decode(#[from] image::ImageError),

    #[error("frame-grab capability unavailable: {0}")]
    CapabilityMissing(String),
}

impl FingerprintError {
    pub fn kind(&self) -> FailureKind {
        match self {
            FingerprintError::Tool(_) | FingerprintError::CapabilityMissing(_) => {
                FailureKind::ToolInvocation
            }
            FingerprintError::EmptyFrame { .. } | FingerprintError::Decode(_) => {
                FailureKind::FrameUnavailable
            }
        }
    }

    /// `true` when the frame-grab tool itself is missing.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            FingerprintError::CapabilityMissing(_)
                | FingerprintError::Tool(ToolError::NotFound { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_frame_is_frame_unavailable() {
        let err = FingerprintError::EmptyFrame { offset_secs: 1.5 };
        assert_eq!(err.kind(), FailureKind::FrameUnavailable);
        assert_eq!(err.to_string(), "frame grab at 1.5s returned no data");
    }

    #[test]
    fn missing_ffmpeg_is_configuration() {
        let err = FingerprintError::from(ToolError::NotFound {
            program: "ffmpeg".to_owned(),
        });
        assert!(err.is_configuration());
        assert_eq!(err.kind(), FailureKind::ToolInvocation);
    }
}
