pub mod manifest;
pub mod quality;
pub mod video;

pub use manifest::{Manifest, ProgressiveCandidate, Representation, VideoCodec};
pub use quality::{label_for_code, InvalidQualityChain, QualityChain, QualityTier};
pub use video::{EmoteTable, RelatedVideo, VideoTarget};
