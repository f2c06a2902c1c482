//! Stage 1 (admission-controlled reachability probing) and stage 2 (deep
//! media inspection) of the stream validation pipeline.

pub mod admission;
pub mod deep;
pub mod error;
pub mod inspect;
pub mod prober;
pub mod reachability;
pub mod tool;

mod retry;

pub use admission::{AdmissionController, Adjustment};
pub use deep::DeepProber;
pub use error::{ProbeError, ToolError};
pub use inspect::{FfprobeInspector, FormatInfo, MediaInfo, MediaInspector, TrackInfo};
pub use prober::AdmissionProber;
pub use reachability::{HttpReachabilityClient, PrefixRead, ReachabilityClient};
