//! Video identity and side content

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What a session plays: the video (bvid) and its stream (cid)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoTarget {
    pub bvid: String,
    pub cid: u64,
}

impl VideoTarget {
    pub fn new(bvid: impl Into<String>, cid: u64) -> Self {
        Self { bvid: bvid.into(), cid }
    }
}

/// Entry of the related-videos list shown beside the player
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedVideo {
    pub bvid: String,
    pub cid: u64,
    pub title: String,
    pub cover: String,
    pub author: String,
    pub duration_secs: u64,
}

/// Emote shortcode (`[doge]`) to image URL
pub type EmoteTable = HashMap<String, String>;
