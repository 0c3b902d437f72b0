//! Resolved playback manifest

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Single muxed (audio+video) URL delivered by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressiveCandidate {
    pub url: String,
    pub size: u64,
    pub backup_urls: Vec<String>,
}

/// One adaptive (DASH) elementary stream
///
/// For video, `id` is the quality tier code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Representation {
    pub id: u32,
    pub base_url: String,
    pub backup_urls: Vec<String>,
    pub codecs: String,
    pub bandwidth: u64,
    pub width: u64,
    pub height: u64,
}

impl Representation {
    #[must_use]
    pub fn codec(&self) -> VideoCodec {
        VideoCodec::from_codecs(&self.codecs)
    }
}

/// Playability result for one (video, stream, quality request) triple
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub progressive: Vec<ProgressiveCandidate>,
    pub video: Vec<Representation>,
    pub audio: Vec<Representation>,
    /// Tier codes the backend offers for this video
    pub accept_quality: Vec<u32>,
    /// Labels parallel to `accept_quality`
    pub accept_description: Vec<String>,
    /// Tier the backend actually granted
    pub granted_quality: u32,
    pub duration: Duration,
}

impl Manifest {
    /// At least one progressive candidate or adaptive video stream
    #[must_use]
    pub fn is_playable(&self) -> bool {
        self.progressive.iter().any(|c| !c.url.is_empty())
            || self.video.iter().any(|r| !r.base_url.is_empty())
    }

    #[must_use]
    pub fn is_adaptive(&self) -> bool {
        !self.video.is_empty()
    }

    /// Backend label for an accepted tier code
    #[must_use]
    pub fn label_for(&self, code: u32) -> Option<&str> {
        self.accept_quality
            .iter()
            .position(|&q| q == code)
            .and_then(|i| self.accept_description.get(i))
            .map(String::as_str)
    }
}

/// Video codec family, parsed from a representation's `codecs` string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    Avc,
    Hevc,
    Av1,
    DolbyVision,
    Other,
}

impl VideoCodec {
    /// Default selection order: widest decoder support first
    pub const DEFAULT_PREFERENCE: [Self; 4] = [Self::Avc, Self::Hevc, Self::Av1, Self::DolbyVision];

    #[must_use]
    pub fn from_codecs(codecs: &str) -> Self {
        let prefix = codecs.split('.').next().unwrap_or_default().to_ascii_lowercase();
        match prefix.as_str() {
            "avc1" | "avc3" => Self::Avc,
            "hev1" | "hvc1" => Self::Hevc,
            "av01" => Self::Av1,
            "dvh1" | "dvhe" => Self::DolbyVision,
            _ => Self::Other,
        }
    }
}

impl std::str::FromStr for VideoCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "avc" | "h264" => Ok(Self::Avc),
            "hevc" | "h265" => Ok(Self::Hevc),
            "av1" => Ok(Self::Av1),
            "dolbyvision" | "dolby_vision" | "dvh1" => Ok(Self::DolbyVision),
            other => Err(format!("Unknown codec: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rep(id: u32, url: &str) -> Representation {
        Representation {
            id,
            base_url: url.to_string(),
            backup_urls: Vec::new(),
            codecs: "avc1.640032".to_string(),
            bandwidth: 0,
            width: 0,
            height: 0,
        }
    }

    #[test]
    fn test_empty_manifest_is_not_playable() {
        assert!(!Manifest::default().is_playable());
    }

    #[test]
    fn test_manifest_with_blank_urls_is_not_playable() {
        let manifest = Manifest { video: vec![rep(80, "")], ..Default::default() };
        assert!(!manifest.is_playable());
    }

    #[test]
    fn test_progressive_only_is_playable() {
        let manifest = Manifest {
            progressive: vec![ProgressiveCandidate {
                url: "https://upos/v.flv".to_string(),
                size: 1,
                backup_urls: Vec::new(),
            }],
            ..Default::default()
        };
        assert!(manifest.is_playable());
        assert!(!manifest.is_adaptive());
    }

    #[test]
    fn test_label_for() {
        let manifest = Manifest {
            accept_quality: vec![80, 64],
            accept_description: vec!["1080P 高清".to_string(), "720P 高清".to_string()],
            ..Default::default()
        };
        assert_eq!(manifest.label_for(64), Some("720P 高清"));
        assert_eq!(manifest.label_for(32), None);
    }

    #[test]
    fn test_codec_from_codecs_string() {
        assert_eq!(VideoCodec::from_codecs("avc1.640032"), VideoCodec::Avc);
        assert_eq!(VideoCodec::from_codecs("hev1.1.6.L150.90"), VideoCodec::Hevc);
        assert_eq!(VideoCodec::from_codecs("av01.0.08M.08"), VideoCodec::Av1);
        assert_eq!(VideoCodec::from_codecs("dvh1.08.07"), VideoCodec::DolbyVision);
        assert_eq!(VideoCodec::from_codecs("mp4a.40.2"), VideoCodec::Other);
    }

    #[test]
    fn test_codec_from_str() {
        assert_eq!("HEVC".parse::<VideoCodec>(), Ok(VideoCodec::Hevc));
        assert!("vp9".parse::<VideoCodec>().is_err());
    }
}
