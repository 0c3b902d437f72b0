// Playback Backend Traits
//
// Seams between the playback subsystem and the remote API

use async_trait::async_trait;
use bilistream_providers::bilibili::{SignedRequest, WbiKeys};
use bytes::Bytes;

use crate::models::{EmoteTable, Manifest, RelatedVideo};
use crate::playback::TransportOutcome;

/// Source of signed manifest lookups
///
/// The request is already signed; implementations only transport it and
/// convert the reply.
#[async_trait]
pub trait ManifestSource: Send + Sync {
    /// Fetch the manifest for one signed play-url request
    async fn fetch_manifest(&self, request: &SignedRequest) -> Result<Manifest, TransportOutcome>;
}

/// Everything a playback session needs from the backend
#[async_trait]
pub trait PlaybackBackend: ManifestSource {
    /// Related videos shown beside the player
    async fn related_videos(&self, bvid: &str) -> Result<Vec<RelatedVideo>, TransportOutcome>;

    /// Emote shortcode table for rendering overlay text
    async fn emote_table(&self) -> Result<EmoteTable, TransportOutcome>;

    /// Raw overlay (danmaku) payload, plain or deflated
    async fn overlay_bytes(&self, cid: u64) -> Result<Bytes, TransportOutcome>;

    /// Fetch the current signing key pair
    async fn signing_keys(&self) -> Result<WbiKeys, TransportOutcome>;
}
