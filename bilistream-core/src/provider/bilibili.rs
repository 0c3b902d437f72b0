//! Bilibili PlaybackBackend Adapter
//!
//! Adapter that calls BilibiliClient to implement the playback traits

use async_trait::async_trait;
use bilistream_providers::bilibili::{
    BilibiliClient, BilibiliError, DashStream, PlayUrlData, RelatedItem, SignedRequest, WbiKeys,
};
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::{ManifestSource, PlaybackBackend, SessionContext};
use crate::models::{
    EmoteTable, Manifest, ProgressiveCandidate, RelatedVideo, Representation, VideoTarget,
};
use crate::playback::{TransportFailure, TransportOutcome};
use crate::{Error, Result};

/// Emotes that are always available, even when the panel cannot be fetched
const DEFAULT_EMOTES: [(&str, &str); 3] = [
    ("[doge]", "http://i0.hdslb.com/bfs/emote/6f8743c3c13009f4705307b2750e32f5068225e3.png"),
    ("[笑哭]", "http://i0.hdslb.com/bfs/emote/500b63b2f293309a909403a746566fdd6104d498.png"),
    ("[妙啊]", "http://i0.hdslb.com/bfs/emote/03c39c8eb009f63568971032b49c716259c72441.png"),
];

/// Bilibili playback backend
#[derive(Clone)]
pub struct BilibiliBackend {
    client: BilibiliClient,
}

impl BilibiliBackend {
    #[must_use]
    pub const fn new(client: BilibiliClient) -> Self {
        Self { client }
    }

    #[must_use]
    pub const fn client(&self) -> &BilibiliClient {
        &self.client
    }

    /// Build the session context from the nav endpoint
    ///
    /// Missing key URLs are not an error here; negotiation reports them.
    pub async fn session_context(&self) -> Result<SessionContext> {
        let nav = self.client.nav_info().await?;
        let credentials_present = self.client.has_session() && nav.is_login;
        let vip = credentials_present && nav.vip_status == 1;

        let keys = match nav.wbi_img.as_ref() {
            Some(img) => match WbiKeys::from_urls(&img.img_url, &img.sub_url) {
                Ok(keys) => Some(keys),
                Err(e) => {
                    warn!(error = %e, "Nav returned unusable signing key URLs");
                    None
                }
            },
            None => {
                warn!("Nav returned no signing key URLs");
                None
            }
        };

        info!(
            logged_in = credentials_present,
            vip,
            uname = %nav.uname,
            has_keys = keys.is_some(),
            "Session context loaded"
        );
        Ok(SessionContext { credentials_present, vip, keys })
    }

    /// Resolve a video URL or bare BV id to its default stream
    ///
    /// A missing cid is passed through as 0 for the session to report.
    pub async fn resolve_target(&self, input: &str) -> Result<VideoTarget> {
        let bvid = BilibiliClient::extract_bvid(input)
            .ok_or_else(|| Error::InvalidInput(format!("No BV id in {input}")))?;
        let view = self.client.video_view(&bvid).await?;
        debug!(bvid = %view.bvid, cid = view.cid, title = %view.title, "Resolved video");
        Ok(VideoTarget::new(view.bvid, view.cid))
    }
}

#[async_trait]
impl ManifestSource for BilibiliBackend {
    async fn fetch_manifest(&self, request: &SignedRequest) -> std::result::Result<Manifest, TransportOutcome> {
        self.client
            .play_url(request)
            .await
            .map(manifest_from)
            .map_err(outcome_from)
    }
}

#[async_trait]
impl PlaybackBackend for BilibiliBackend {
    async fn related_videos(&self, bvid: &str) -> std::result::Result<Vec<RelatedVideo>, TransportOutcome> {
        let items = self.client.related(bvid).await.map_err(outcome_from)?;
        Ok(items.into_iter().map(related_from).collect())
    }

    async fn emote_table(&self) -> std::result::Result<EmoteTable, TransportOutcome> {
        let mut table = default_emotes();
        match self.client.emote_panel().await {
            Ok(emotes) => {
                debug!(count = emotes.len(), "Loaded emote panel");
                table.extend(emotes.into_iter().map(|e| (e.text, e.url)));
            }
            Err(e) => warn!(error = %e, "Emote panel unavailable, using defaults"),
        }
        Ok(table)
    }

    async fn overlay_bytes(&self, cid: u64) -> std::result::Result<Bytes, TransportOutcome> {
        self.client.danmaku_raw(cid).await.map_err(outcome_from)
    }

    async fn signing_keys(&self) -> std::result::Result<WbiKeys, TransportOutcome> {
        self.client.wbi_keys().await.map_err(outcome_from)
    }
}

/// Built-in emote table
#[must_use]
pub fn default_emotes() -> EmoteTable {
    DEFAULT_EMOTES
        .iter()
        .map(|(text, url)| ((*text).to_string(), (*url).to_string()))
        .collect()
}

/// Reduce a client error to what the classifier needs
fn outcome_from(err: BilibiliError) -> TransportOutcome {
    match err {
        BilibiliError::Timeout(_) => TransportOutcome::Transport(TransportFailure::Timeout),
        BilibiliError::Connect(_) => TransportOutcome::Transport(TransportFailure::Connect),
        BilibiliError::Network(_) => TransportOutcome::Transport(TransportFailure::Reset),
        BilibiliError::Http { status, .. } => TransportOutcome::http(status.as_u16()),
        BilibiliError::Api { code, message } => TransportOutcome::backend(code, message),
        other => TransportOutcome::Unrecognised(other.to_string()),
    }
}

fn manifest_from(data: PlayUrlData) -> Manifest {
    let (video, audio, dash_duration) = match data.dash {
        Some(dash) => (
            dash.video.into_iter().map(representation_from).collect(),
            dash.audio.unwrap_or_default().into_iter().map(representation_from).collect(),
            Duration::try_from_secs_f64(dash.duration).unwrap_or_default(),
        ),
        None => (Vec::new(), Vec::new(), Duration::ZERO),
    };
    let progressive = data
        .durl
        .unwrap_or_default()
        .into_iter()
        .map(|d| ProgressiveCandidate {
            url: d.url,
            size: d.size,
            backup_urls: d.backup_url.unwrap_or_default(),
        })
        .collect();

    Manifest {
        progressive,
        video,
        audio,
        accept_quality: data.accept_quality,
        accept_description: data.accept_description,
        granted_quality: data.quality,
        duration: if data.timelength > 0 {
            Duration::from_millis(data.timelength)
        } else {
            dash_duration
        },
    }
}

fn representation_from(stream: DashStream) -> Representation {
    Representation {
        id: stream.id,
        base_url: stream.base_url,
        backup_urls: stream.backup_url.unwrap_or_default(),
        codecs: stream.codecs,
        bandwidth: stream.bandwidth,
        width: stream.width,
        height: stream.height,
    }
}

fn related_from(item: RelatedItem) -> RelatedVideo {
    RelatedVideo {
        bvid: item.bvid,
        cid: item.cid,
        title: item.title,
        cover: item.pic,
        author: item.owner.map(|o| o.name).unwrap_or_default(),
        duration_secs: item.duration,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{classify, ClassifiedError};
    use bilistream_providers::bilibili::PlayUrlResp;

    #[test]
    fn test_outcome_mapping_feeds_classifier() {
        let http = BilibiliError::Http {
            status: reqwest::StatusCode::PRECONDITION_FAILED,
            url: "https://api.bilibili.com/x/player/wbi/playurl".to_string(),
        };
        assert_eq!(classify(&outcome_from(http)), ClassifiedError::SignatureRejected);

        let api = BilibiliError::Api { code: -404, message: "啥都木有".to_string() };
        assert_eq!(classify(&outcome_from(api)), ClassifiedError::NotFound);

        let timeout = BilibiliError::Timeout("deadline".to_string());
        assert_eq!(classify(&outcome_from(timeout)), ClassifiedError::Network);

        let parse = BilibiliError::Parse("eof".to_string());
        assert_eq!(classify(&outcome_from(parse)), ClassifiedError::Unknown);
    }

    #[test]
    fn test_manifest_from_dash() {
        let body = r#"{"code":0,"message":"0","data":{
            "quality":80,"accept_quality":[80,64],"accept_description":["1080P 高清","720P 高清"],
            "timelength":212000,
            "dash":{"duration":212,"video":[
                {"id":80,"baseUrl":"https://upos/v80.m4s","backupUrl":["https://bak/v80.m4s"],
                 "codecs":"avc1.640032","bandwidth":2000,"width":1920,"height":1080}],
              "audio":null}}}"#;
        let data = serde_json::from_str::<PlayUrlResp>(body).unwrap().data.unwrap();

        let manifest = manifest_from(data);
        assert!(manifest.is_playable());
        assert!(manifest.audio.is_empty());
        assert_eq!(manifest.video[0].backup_urls, vec!["https://bak/v80.m4s".to_string()]);
        assert_eq!(manifest.granted_quality, 80);
        assert_eq!(manifest.duration, Duration::from_secs(212));
        assert_eq!(manifest.label_for(64), Some("720P 高清"));
    }

    #[test]
    fn test_manifest_from_progressive() {
        let body = r#"{"code":0,"data":{"quality":64,"durl":[{"url":"https://upos/v.mp4","size":10}]}}"#;
        let data = serde_json::from_str::<PlayUrlResp>(body).unwrap().data.unwrap();

        let manifest = manifest_from(data);
        assert!(manifest.is_playable());
        assert!(!manifest.is_adaptive());
        assert_eq!(manifest.progressive[0].size, 10);
    }

    #[test]
    fn test_default_emotes() {
        let table = default_emotes();
        assert_eq!(table.len(), 3);
        assert!(table["[doge]"].ends_with("6f8743c3c13009f4705307b2750e32f5068225e3.png"));
    }
}
