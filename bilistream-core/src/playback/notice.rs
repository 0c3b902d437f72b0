//! Transient user-facing notifications

use serde::Serialize;
use std::fmt;

/// One-shot message for the UI (toast)
///
/// Labels are the backend's own descriptions when known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    AlreadySwitching,
    AlreadyAtQuality { label: String },
    Switched { label: String },
    /// The requested tier needs an entitlement this session lacks
    EntitlementDowngrade { requested: String, granted: String },
    /// The backend granted less for some other reason
    TransientDowngrade { requested: String, granted: String },
    SwitchFailed { reason: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadySwitching => write!(f, "Switching quality, please wait..."),
            Self::AlreadyAtQuality { label } => write!(f, "Already playing {label}"),
            Self::Switched { label } => write!(f, "Switched to {label}"),
            Self::EntitlementDowngrade { requested, granted } => {
                write!(f, "{requested} requires a premium login, switched to {granted}")
            }
            Self::TransientDowngrade { requested, granted } => {
                write!(f, "{requested} is unavailable right now, switched to {granted}")
            }
            Self::SwitchFailed { reason } => write!(f, "Quality switch failed: {reason}"),
        }
    }
}
