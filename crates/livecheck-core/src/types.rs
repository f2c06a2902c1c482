use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::failure::StageFailure;
use crate::hash::HashTriple;

/// One candidate row produced by upstream ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateStream {
    pub display_name: String,
    pub url: String,
    #[serde(default)]
    pub source_tag: String,
    #[serde(default)]
    pub logo_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ProbeMethod {
    Head,
    Get,
}

/// Stage 1 result for one URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub url: String,
    pub reachable: bool,
    /// Round-trip time of the successful request in milliseconds.
    pub latency_ms: Option<u64>,
    pub method_used: Option<ProbeMethod>,
    pub status: Option<u16>,
    pub attempts: u32,
    pub error: Option<StageFailure>,
}

/// Stage 2 result for one URL.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeepProbeResult {
    pub url: String,
    pub has_video: bool,
    pub has_audio: bool,
    pub codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub duration_secs: Option<f64>,
    pub bit_rate: Option<u64>,
    pub error: Option<StageFailure>,
}

impl DeepProbeResult {
    /// A URL survives stage 2 only with a video track and no recorded error.
    pub fn is_valid(&self) -> bool {
        self.has_video && self.error.is_none()
    }

    /// `WxH @fps fps, duration Ds, bitrate Bbps` with `?` for unknown fields.
    pub fn video_summary(&self) -> String {
        fn or_unknown<T: ToString>(v: Option<T>) -> String {
            v.map_or_else(|| "?".to_owned(), |v| v.to_string())
        }
        format!(
            "{}x{} @{} fps, duration {}s, bitrate {}bps",
            or_unknown(self.width),
            or_unknown(self.height),
            or_unknown(self.frame_rate.map(|r| format!("{r:.2}"))),
            or_unknown(self.duration_secs.map(|d| format!("{d:.1}"))),
            or_unknown(self.bit_rate),
        )
    }
}

/// Hashes sampled for one URL in one (date, timepoint) slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameHashSample {
    pub url: String,
    pub timepoint: String,
    pub sample_date: NaiveDate,
    pub hashes: Option<HashTriple>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerdictBasis {
    #[serde(rename = "static frames")]
    StaticFrames,
    #[serde(rename = "historical match")]
    HistoricalMatch,
    #[serde(rename = "no match")]
    NoMatch,
}

impl std::fmt::Display for VerdictBasis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VerdictBasis::StaticFrames => write!(f, "static frames"),
            VerdictBasis::HistoricalMatch => write!(f, "historical match"),
            VerdictBasis::NoMatch => write!(f, "no match"),
        }
    }
}

/// Stage 3 classification for one URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FakeVerdict {
    pub url: String,
    pub is_fake: bool,
    pub max_similarity: f64,
    pub basis: VerdictBasis,
}

/// Terminal bucket a URL lands in after a full run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeBucket {
    Stage1Invalid,
    Stage2Invalid,
    Stage3Undetermined,
    Valid,
    Fake,
}

impl OutcomeBucket {
    pub const ALL: [OutcomeBucket; 5] = [
        OutcomeBucket::Stage1Invalid,
        OutcomeBucket::Stage2Invalid,
        OutcomeBucket::Stage3Undetermined,
        OutcomeBucket::Valid,
        OutcomeBucket::Fake,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeBucket::Stage1Invalid => "stage1_invalid",
            OutcomeBucket::Stage2Invalid => "stage2_invalid",
            OutcomeBucket::Stage3Undetermined => "stage3_undetermined",
            OutcomeBucket::Valid => "valid",
            OutcomeBucket::Fake => "fake",
        }
    }
}

/// Everything known about one candidate at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamOutcome {
    pub candidate: CandidateStream,
    pub bucket: OutcomeBucket,
    pub probe: Option<ProbeResult>,
    pub deep_probe: Option<DeepProbeResult>,
    pub verdict: Option<FakeVerdict>,
    /// The failure that ended the URL's run, if any.
    pub failure: Option<StageFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::failure::FailureKind;

    #[test]
    fn candidate_defaults_optional_columns() {
        let c: CandidateStream =
            serde_json::from_str(r#"{"display_name":"CCTV-1","url":"http://x/1.m3u8"}"#).unwrap();
        assert_eq!(c.source_tag, "");
        assert_eq!(c.logo_ref, "");
    }

    #[test]
    fn deep_probe_validity_requires_video_and_no_error() {
        let mut r = DeepProbeResult {
            url: "u".to_owned(),
            has_video: true,
            ..DeepProbeResult::default()
        };
        assert!(r.is_valid());
        r.error = Some(StageFailure::new(FailureKind::Parse, "bad"));
        assert!(!r.is_valid());
    }

    #[test]
    fn video_summary_marks_unknowns() {
        let r = DeepProbeResult {
            url: "u".to_owned(),
            has_video: true,
            width: Some(1920),
            height: Some(1080),
            frame_rate: Some(25.0),
            ..DeepProbeResult::default()
        };
        assert_eq!(
            r.video_summary(),
            "1920x1080 @25.00 fps, duration ?s, bitrate ?bps"
        );
    }

    #[test]
    fn verdict_basis_serializes_human_labels() {
        let json = serde_json::to_string(&VerdictBasis::StaticFrames).unwrap();
        assert_eq!(json, "\"static frames\"");
        assert_eq!(VerdictBasis::HistoricalMatch.to_string(), "historical match");
    }

    #[test]
    fn bucket_labels_match_serde() {
        for bucket in OutcomeBucket::ALL {
            let json = serde_json::to_string(&bucket).unwrap();
            assert_eq!(json, format!("\"{}\"", bucket.as_str()));
        }
    }
}
