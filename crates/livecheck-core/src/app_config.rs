use std::path::PathBuf;

use crate::timepoint::TimepointSet;

/// Tuning knobs for the adaptive admission controller.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionPolicy {
    /// Grow concurrency when the success rate is above this.
    pub high_success_rate: f64,
    /// Shrink concurrency when the success rate is below this.
    pub low_success_rate: f64,
    pub grow_factor: f64,
    pub shrink_factor: f64,
    pub timeout_step_secs: u64,
    /// Raise the timeout when average latency exceeds this fraction of it.
    pub raise_latency_ratio: f64,
    /// Lower the timeout when average latency is under this fraction of it.
    pub lower_latency_ratio: f64,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            high_success_rate: 0.8,
            low_success_rate: 0.5,
            grow_factor: 1.2,
            shrink_factor: 0.7,
            timeout_step_secs: 1,
            raise_latency_ratio: 0.8,
            lower_latency_ratio: 0.5,
        }
    }
}

/// Stage 1 settings.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmissionConfig {
    pub initial_concurrency: usize,
    pub min_concurrency: usize,
    pub max_concurrency: usize,
    pub initial_timeout_secs: u64,
    pub min_timeout_secs: u64,
    pub max_timeout_secs: u64,
    /// Completions between two admission adjustments.
    pub batch_size: usize,
    /// Total attempts per URL, including the first.
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    /// Bytes read from a GET body before the stream counts as live.
    pub prefix_bytes: usize,
    pub user_agent: String,
    pub policy: AdmissionPolicy,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            initial_concurrency: 100,
            min_concurrency: 20,
            max_concurrency: 200,
            initial_timeout_secs: 8,
            min_timeout_secs: 4,
            max_timeout_secs: 15,
            batch_size: 100,
            max_attempts: 2,
            backoff_base_ms: 100,
            prefix_bytes: 4096,
            user_agent: "livecheck/0.1 (stream-validation)".to_owned(),
            policy: AdmissionPolicy::default(),
        }
    }
}

/// Stage 2 settings.
#[derive(Debug, Clone, PartialEq)]
pub struct DeepProbeConfig {
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub ffprobe_bin: String,
}

impl Default for DeepProbeConfig {
    fn default() -> Self {
        Self {
            concurrency: 30,
            timeout_secs: 20,
            ffprobe_bin: "ffprobe".to_owned(),
        }
    }
}

/// Stage 3 settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FingerprintConfig {
    pub concurrency: usize,
    pub timeout_secs: u64,
    /// Offsets into the stream, in seconds, at which frames are grabbed.
    pub frame_offsets_secs: Vec<f64>,
    pub ffmpeg_bin: String,
    /// Frames whose mean luminance (0-255) is below this are blank.
    pub blank_luma_threshold: f64,
    pub static_similarity_threshold: f64,
    pub fake_similarity_threshold: f64,
}

impl Default for FingerprintConfig {
    fn default() -> Self {
        Self {
            concurrency: 6,
            timeout_secs: 20,
            frame_offsets_secs: vec![1.0, 1.5, 2.0],
            ffmpeg_bin: "ffmpeg".to_owned(),
            blank_luma_threshold: 8.0,
            static_similarity_threshold: 0.95,
            fake_similarity_threshold: 0.95,
        }
    }
}

/// Partitioning and shard scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardConfig {
    pub shard_size: usize,
    /// Shards running at once inside one process.
    pub parallelism: usize,
    /// Delay between consecutive shard starts.
    pub stagger_secs: u64,
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            shard_size: 1000,
            parallelism: 1,
            stagger_secs: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub cache_dir: PathBuf,
    pub timepoints: TimepointSet,
    pub admission: AdmissionConfig,
    pub deep_probe: DeepProbeConfig,
    pub fingerprint: FingerprintConfig,
    pub shard: ShardConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            cache_dir: PathBuf::from("output/cache"),
            timepoints: TimepointSet::default(),
            admission: AdmissionConfig::default(),
            deep_probe: DeepProbeConfig::default(),
            fingerprint: FingerprintConfig::default(),
            shard: ShardConfig::default(),
        }
    }
}
