use livecheck_core::FailureKind;
use thiserror::Error;

/// Failures of an external command-line capability.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("{program} is not installed or not on PATH")]
    NotFound { program: String },

    #[error("failed to run {program}: {source}")]
    Io {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} timed out after {secs}s and was killed")]
    Timeout { program: String, secs: u64 },

    #[error("{program} exited with {code}: {stderr}")]
    NonZeroExit {
        program: String,
        code: String,
        stderr: String,
    },
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    #[error(transparent)]
    Tool(#[from] ToolError),

    #[error("malformed inspection output for {url}: {reason}")]
    Parse { url: String, reason: String },

    #[error("no video stream in {url}")]
    NoVideo { url: String },

    #[error("media inspection capability unavailable: {0}")]
    CapabilityMissing(String),
}

impl ProbeError {
    /// Failure class used in per-URL outcome reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            ProbeError::Http(_) | ProbeError::UnexpectedStatus { .. } => FailureKind::Network,
            ProbeError::Tool(_) | ProbeError::CapabilityMissing(_) => FailureKind::ToolInvocation,
            ProbeError::Parse { .. } | ProbeError::NoVideo { .. } => FailureKind::Parse,
        }
    }

    /// `true` when the error means a required tool is absent, which aborts
    /// the run instead of failing a single URL.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ProbeError::CapabilityMissing(_) | ProbeError::Tool(ToolError::NotFound { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_errors_are_network_kind() {
        let err = ProbeError::UnexpectedStatus {
            status: 404,
            url: "http://x".to_owned(),
        };
        assert_eq!(err.kind(), FailureKind::Network);
        assert!(!err.is_configuration());
    }

    #[test]
    fn missing_tool_is_configuration() {
        let err = ProbeError::from(ToolError::NotFound {
            program: "ffprobe".to_owned(),
        });
        assert!(err.is_configuration());
        assert_eq!(err.kind(), FailureKind::ToolInvocation);
    }

    #[test]
    fn tool_timeout_is_per_url() {
        let err = ProbeError::from(ToolError::Timeout {
            program: "ffprobe".to_owned(),
            secs: 20,
        });
        assert!(!err.is_configuration());
        assert_eq!(err.to_string(), "ffprobe timed out after 20s and was killed");
    }

    #[test]
    fn missing_video_is_parse_kind() {
        let err = ProbeError::NoVideo {
            url: "http://x".to_owned(),
        };
        assert_eq!(err.kind(), FailureKind::Parse);
    }
}
