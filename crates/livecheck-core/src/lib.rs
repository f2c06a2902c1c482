//! Shared data model, failure taxonomy, and configuration for the stream
//! validation pipeline.

pub mod app_config;
pub mod config;
pub mod failure;
pub mod hash;
pub mod timepoint;
pub mod types;

use thiserror::Error;

pub use app_config::{
    AdmissionConfig, AdmissionPolicy, AppConfig, DeepProbeConfig, FingerprintConfig, ShardConfig,
};
pub use config::{load_app_config, load_app_config_from_env};
pub use failure::{FailureKind, StageFailure};
pub use hash::{HashParseError, HashTriple, PerceptualHash, HASH_BITS};
pub use timepoint::TimepointSet;
pub use types::{
    CandidateStream, DeepProbeResult, FakeVerdict, FrameHashSample, OutcomeBucket, ProbeMethod,
    ProbeResult, StreamOutcome, VerdictBasis,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar { var: String, reason: String },

    #[error("invalid timepoint labels: {0}")]
    InvalidTimepoints(String),
}
