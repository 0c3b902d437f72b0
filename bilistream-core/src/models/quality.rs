//! Video quality tiers and the fallback chain

use serde::{Deserialize, Serialize};
use std::fmt;

/// Backend quality code (`qn`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u32", try_from = "u32")]
pub enum QualityTier {
    P240 = 6,
    P360 = 16,
    P480 = 32,
    P720 = 64,
    P720F60 = 74,
    P1080 = 80,
    P1080Plus = 112,
    P1080F60 = 116,
    K4 = 120,
    Hdr = 125,
    DolbyVision = 126,
    K8 = 127,
}

impl QualityTier {
    /// All tiers, ascending
    pub const ALL: [Self; 12] = [
        Self::P240,
        Self::P360,
        Self::P480,
        Self::P720,
        Self::P720F60,
        Self::P1080,
        Self::P1080Plus,
        Self::P1080F60,
        Self::K4,
        Self::Hdr,
        Self::DolbyVision,
        Self::K8,
    ];

    /// Highest tier anonymous callers are served
    pub const GUEST_CEILING: Self = Self::P1080;

    #[must_use]
    pub const fn code(self) -> u32 {
        self as u32
    }

    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.code() == code)
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::P240 => "240P",
            Self::P360 => "360P",
            Self::P480 => "480P",
            Self::P720 => "720P",
            Self::P720F60 => "720P60",
            Self::P1080 => "1080P",
            Self::P1080Plus => "1080P+",
            Self::P1080F60 => "1080P60",
            Self::K4 => "4K",
            Self::Hdr => "HDR",
            Self::DolbyVision => "Dolby Vision",
            Self::K8 => "8K",
        }
    }

    /// Tiers above 1080P are reserved for premium members
    #[must_use]
    pub fn requires_membership(self) -> bool {
        self > Self::GUEST_CEILING
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<QualityTier> for u32 {
    fn from(tier: QualityTier) -> Self {
        tier.code()
    }
}

impl TryFrom<u32> for QualityTier {
    type Error = InvalidQualityChain;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or(InvalidQualityChain::UnknownCode(code))
    }
}

/// Human label for a raw backend code, known or not
#[must_use]
pub fn label_for_code(code: u32) -> String {
    QualityTier::from_code(code).map_or_else(|| format!("qn {code}"), |t| t.label().to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidQualityChain {
    #[error("Quality chain is empty")]
    Empty,

    #[error("Unknown quality code: {0}")]
    UnknownCode(u32),

    #[error("Quality chain must be strictly descending at position {0}")]
    NotDescending(usize),
}

/// Fixed, strictly descending list of known-good tiers walked during fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualityChain {
    tiers: Vec<QualityTier>,
}

impl QualityChain {
    pub fn new(tiers: Vec<QualityTier>) -> Result<Self, InvalidQualityChain> {
        if tiers.is_empty() {
            return Err(InvalidQualityChain::Empty);
        }
        if let Some(pos) = tiers.windows(2).position(|w| w[0] <= w[1]) {
            return Err(InvalidQualityChain::NotDescending(pos + 1));
        }
        Ok(Self { tiers })
    }

    /// Build from raw codes (configuration)
    pub fn from_codes(codes: &[u32]) -> Result<Self, InvalidQualityChain> {
        let tiers = codes
            .iter()
            .map(|&c| QualityTier::try_from(c))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(tiers)
    }

    #[must_use]
    pub fn tiers(&self) -> &[QualityTier] {
        &self.tiers
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<QualityTier> {
        self.tiers.get(index).copied()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    /// Index of the entry to start from for a requested code: the highest
    /// entry not above the request, or the floor when the request is below
    /// every entry.
    #[must_use]
    pub fn start_index(&self, requested: u32) -> usize {
        self.tiers
            .iter()
            .position(|t| t.code() <= requested)
            .unwrap_or(self.tiers.len() - 1)
    }
}

impl Default for QualityChain {
    fn default() -> Self {
        Self {
            tiers: vec![
                QualityTier::K4,
                QualityTier::P1080F60,
                QualityTier::P1080Plus,
                QualityTier::P1080,
                QualityTier::P720,
                QualityTier::P480,
                QualityTier::P360,
            ],
        }
    }
}
