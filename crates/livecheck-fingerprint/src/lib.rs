//! Stage 3 of the stream validation pipeline: frame sampling, perceptual
//! hashing and fake-stream detection.

pub mod detector;
pub mod error;
pub mod grabber;
pub mod hashing;

pub use detector::{classify, Detection, FakeDetector, SampleSlot, Thresholds};
pub use error::FingerprintError;
pub use grabber::{FfmpegFrameGrabber, FrameGrabber};
pub use hashing::{analyze_frame, hash_triple, FrameAnalysis};
