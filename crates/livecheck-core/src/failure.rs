//! Per-URL failure taxonomy.
//!
//! Every stage reports URL-local failures through [`StageFailure`] so the
//! final outcome can name the stage, the failure class, and the original
//! error text without consulting logs. Configuration errors are not part of
//! this taxonomy: they abort the run and surface through the run's `Result`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Class of a failure that is local to one URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Connect error, timeout, or non-success HTTP status.
    Network,
    /// External tool timed out or exited non-zero.
    ToolInvocation,
    /// Tool output was missing, malformed, or lacked a video track.
    Parse,
    /// No usable frame could be extracted.
    FrameUnavailable,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Network => "network",
            FailureKind::ToolInvocation => "tool_invocation",
            FailureKind::Parse => "parse",
            FailureKind::FrameUnavailable => "frame_unavailable",
        };
        f.write_str(label)
    }
}

/// A recorded per-URL failure: its class plus the rendered error message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl StageFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_message() {
        let failure = StageFailure::new(FailureKind::Network, "connection refused");
        assert_eq!(failure.to_string(), "network: connection refused");
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&FailureKind::FrameUnavailable).unwrap();
        assert_eq!(json, "\"frame_unavailable\"");
    }
}
