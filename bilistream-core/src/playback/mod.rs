//! Adaptive playback resolution
//!
//! `PlaybackSession` drives the flow: `QualityNegotiator` obtains a manifest
//! (classifying failures with `classify`), `StreamResolver` picks the URLs,
//! and `overlay::decode` unpacks the comment track in the background.

pub mod classifier;
pub mod negotiator;
pub mod notice;
pub mod overlay;
pub mod resolver;
pub mod session;

pub use classifier::{
    classify, ClassifiedError, PlaybackError, TransportFailure, TransportOutcome, RETRYABLE_CODES,
};
pub use negotiator::{manifest_request, NegotiationPolicy, QualityNegotiator};
pub use notice::Notice;
pub use overlay::OverlayFormatError;
pub use resolver::{StreamResolver, StreamSelection};
pub use session::{PlaybackSession, ReadyState, SessionOptions, SessionState};
