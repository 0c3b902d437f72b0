//! Failure classification
//!
//! Every failed backend call is reduced to a [`ClassifiedError`]. The
//! negotiator consults [`ClassifiedError::retryable`] and nothing else when
//! deciding whether to retry.

use std::fmt;

use thiserror::Error;

/// Backend codes worth retrying (risk control and gateway hiccups)
pub const RETRYABLE_CODES: [i64; 4] = [-412, -500, -502, -504];

/// Markers in a -403/-10403 message that indicate a membership gate
const MEMBERSHIP_MARKERS: [&str; 2] = ["大会员", "VIP"];

/// Low-level transport failure, before any reply was read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    Timeout,
    Connect,
    Reset,
}

/// Raw result of a failed backend call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportOutcome {
    /// The backend answered: HTTP status (if non-2xx) and/or a JSON `code`
    Reply {
        status: Option<u16>,
        code: Option<i64>,
        message: String,
    },
    /// No reply was received
    Transport(TransportFailure),
    /// Anything else (parse failures, unexpected shapes)
    Unrecognised(String),
}

impl TransportOutcome {
    /// Backend reply carrying a JSON `code`
    pub fn backend(code: i64, message: impl Into<String>) -> Self {
        Self::Reply { status: None, code: Some(code), message: message.into() }
    }

    /// HTTP error status without a readable body
    #[must_use]
    pub const fn http(status: u16) -> Self {
        Self::Reply { status: Some(status), code: None, message: String::new() }
    }
}

impl fmt::Display for TransportOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reply { status, code, message } => {
                write!(f, "reply")?;
                if let Some(status) = status {
                    write!(f, " status={status}")?;
                }
                if let Some(code) = code {
                    write!(f, " code={code}")?;
                }
                if !message.is_empty() {
                    write!(f, " message={message}")?;
                }
                Ok(())
            }
            Self::Transport(kind) => write!(f, "transport failure: {kind:?}"),
            Self::Unrecognised(detail) => write!(f, "unrecognised failure: {detail}"),
        }
    }
}

/// Closed failure taxonomy
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClassifiedError {
    #[error("Network error")]
    Network,

    #[error("Request signature rejected")]
    SignatureRejected,

    #[error("Video not found")]
    NotFound,

    #[error("Region restricted")]
    RegionRestricted,

    #[error("Membership required")]
    MembershipRequired,

    #[error("Stream id missing")]
    StreamIdMissing,

    #[error("Backend error (code {code}): {message}")]
    Backend { code: i64, message: String },

    #[error("Unknown error")]
    Unknown,
}

impl ClassifiedError {
    #[must_use]
    pub fn retryable(&self) -> bool {
        match self {
            Self::Network | Self::SignatureRejected | Self::StreamIdMissing | Self::Unknown => true,
            Self::Backend { code, .. } => RETRYABLE_CODES.contains(code),
            Self::NotFound | Self::RegionRestricted | Self::MembershipRequired => false,
        }
    }

    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Network => "Network connection failed, check your connection and retry".to_string(),
            Self::SignatureRejected => "Verification failed, retrying...".to_string(),
            Self::NotFound => "The video does not exist or has been deleted".to_string(),
            Self::RegionRestricted => "This video is not available in your region".to_string(),
            Self::MembershipRequired => "This video requires a premium membership".to_string(),
            Self::StreamIdMissing => "Failed to load video info, please retry".to_string(),
            Self::Backend { code, message } => format!("Load failed: {message} (code {code})"),
            Self::Unknown => "Load failed: unknown error".to_string(),
        }
    }

    /// Map a backend code (and its message) onto the taxonomy
    #[must_use]
    pub fn from_code(code: i64, message: &str) -> Self {
        match code {
            -404 => Self::NotFound,
            -403 | -10403 => {
                if MEMBERSHIP_MARKERS.iter().any(|m| message.contains(m)) {
                    Self::MembershipRequired
                } else {
                    Self::RegionRestricted
                }
            }
            -412 => Self::SignatureRejected,
            _ => Self::Backend { code, message: message.to_string() },
        }
    }
}

/// Classify a raw failure
#[must_use]
pub fn classify(outcome: &TransportOutcome) -> ClassifiedError {
    match outcome {
        TransportOutcome::Reply { status: Some(412), .. } => ClassifiedError::SignatureRejected,
        TransportOutcome::Reply { code: Some(code), message, .. } => {
            ClassifiedError::from_code(*code, message)
        }
        TransportOutcome::Reply { status: Some(status), message, .. } => {
            ClassifiedError::from_code(-i64::from(*status), message)
        }
        TransportOutcome::Reply { status: None, code: None, .. } => ClassifiedError::Unknown,
        TransportOutcome::Transport(_) => ClassifiedError::Network,
        TransportOutcome::Unrecognised(_) => ClassifiedError::Unknown,
    }
}

/// Session-level failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaybackError {
    #[error(transparent)]
    Classified(#[from] ClassifiedError),

    #[error("No playable stream in manifest")]
    NoPlayableStream,

    #[error("Missing WBI signing keys")]
    MissingSigningKeys,

    #[error("Cancelled")]
    Cancelled,
}

impl PlaybackError {
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Classified(e) => e.user_message(),
            Self::NoPlayableStream => "Unable to get a playable stream".to_string(),
            Self::MissingSigningKeys => "Failed to obtain request signing keys".to_string(),
            Self::Cancelled => "Loading was cancelled".to_string(),
        }
    }

    #[must_use]
    pub const fn classified(&self) -> Option<&ClassifiedError> {
        match self {
            Self::Classified(e) => Some(e),
            _ => None,
        }
    }
}
