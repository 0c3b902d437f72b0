//! Stream selection
//!
//! Picks the concrete video (and audio) URL out of a resolved manifest.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classifier::PlaybackError;
use crate::models::{Manifest, Representation, VideoCodec};

/// URLs handed to the player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamSelection {
    pub video_url: String,
    /// `None` for progressive (muxed) streams and silent videos
    pub audio_url: Option<String>,
    pub granted_quality: u32,
    /// `None` for progressive streams
    pub codec: Option<VideoCodec>,
}

#[derive(Debug, Clone)]
pub struct StreamResolver {
    codec_preference: Vec<VideoCodec>,
}

impl Default for StreamResolver {
    fn default() -> Self {
        Self::new(VideoCodec::DEFAULT_PREFERENCE.to_vec())
    }
}

impl StreamResolver {
    #[must_use]
    pub const fn new(codec_preference: Vec<VideoCodec>) -> Self {
        Self { codec_preference }
    }

    /// Select streams for `requested`
    ///
    /// Adaptive manifests prefer the representation with the requested id and
    /// fall back to the first one. Progressive manifests use the first
    /// candidate with a URL.
    pub fn select(&self, manifest: &Manifest, requested: u32) -> Result<StreamSelection, PlaybackError> {
        let usable_video: Vec<&Representation> =
            manifest.video.iter().filter(|r| !r.base_url.is_empty()).collect();

        if !usable_video.is_empty() {
            let video = self
                .best_codec(usable_video.iter().copied().filter(|r| r.id == requested))
                .or_else(|| usable_video.first().copied())
                .ok_or(PlaybackError::NoPlayableStream)?;
            let audio_url = manifest
                .audio
                .iter()
                .find(|r| !r.base_url.is_empty())
                .map(|r| r.base_url.clone());

            debug!(
                requested,
                chosen = video.id,
                codecs = %video.codecs,
                has_audio = audio_url.is_some(),
                "Selected adaptive streams"
            );
            return Ok(StreamSelection {
                video_url: video.base_url.clone(),
                audio_url,
                granted_quality: video.id,
                codec: Some(video.codec()),
            });
        }

        let candidate = manifest
            .progressive
            .iter()
            .find(|c| !c.url.is_empty())
            .ok_or(PlaybackError::NoPlayableStream)?;

        debug!(requested, granted = manifest.granted_quality, "Selected progressive stream");
        Ok(StreamSelection {
            video_url: candidate.url.clone(),
            audio_url: None,
            granted_quality: manifest.granted_quality,
            codec: None,
        })
    }

    /// First representation with the best-ranked codec
    fn best_codec<'a>(
        &self,
        candidates: impl Iterator<Item = &'a Representation>,
    ) -> Option<&'a Representation> {
        candidates.min_by_key(|r| self.rank(r.codec()))
    }

    fn rank(&self, codec: VideoCodec) -> usize {
        self.codec_preference
            .iter()
            .position(|&c| c == codec)
            .unwrap_or(self.codec_preference.len())
    }
}
