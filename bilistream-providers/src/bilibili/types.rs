//! Bilibili API Data Structures

use serde::Deserialize;

// ============================================================================
// Nav (login state + WBI key URLs)
// ============================================================================

/// User info (Nav) response
///
/// Anonymous callers get code -101 but still receive `wbi_img`.
#[derive(Debug, Clone, Deserialize)]
pub struct NavResp {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<NavData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NavData {
    #[serde(rename = "isLogin", default)]
    pub is_login: bool,
    #[serde(default)]
    pub uname: String,
    #[serde(default)]
    pub face: String,
    #[serde(rename = "vipStatus", default)]
    pub vip_status: u32,
    #[serde(default)]
    pub mid: u64,
    pub wbi_img: Option<WbiImg>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WbiImg {
    pub img_url: String,
    pub sub_url: String,
}

// ============================================================================
// Video metadata
// ============================================================================

/// Video page info response (`/x/web-interface/view`)
#[derive(Debug, Clone, Deserialize)]
pub struct ViewResp {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<ViewData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ViewData {
    pub bvid: String,
    pub aid: u64,
    #[serde(default)]
    pub cid: u64,
    pub title: String,
    #[serde(default)]
    pub pic: String,
    #[serde(default)]
    pub duration: u64,
    pub owner: Option<Owner>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Owner {
    pub name: String,
    #[serde(default)]
    pub face: String,
    #[serde(default)]
    pub mid: u64,
}

// ============================================================================
// Play URL
// ============================================================================

/// Play URL response (`/x/player/wbi/playurl`)
#[derive(Debug, Clone, Deserialize)]
pub struct PlayUrlResp {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<PlayUrlData>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlayUrlData {
    #[serde(default)]
    pub quality: u32,
    #[serde(default)]
    pub accept_quality: Vec<u32>,
    #[serde(default)]
    pub accept_description: Vec<String>,
    #[serde(default)]
    pub timelength: u64,
    pub durl: Option<Vec<DurlInfo>>,
    pub dash: Option<DashInfo>,
    #[serde(default)]
    pub support_formats: Vec<SupportFormat>,
}

/// Progressive (muxed) segment
#[derive(Debug, Clone, Deserialize)]
pub struct DurlInfo {
    pub url: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub length: u64,
    #[serde(default)]
    pub backup_url: Option<Vec<String>>,
}

/// Quality format descriptor from Bilibili API
#[derive(Debug, Clone, Deserialize)]
pub struct SupportFormat {
    pub quality: u32,
    #[serde(default)]
    pub new_description: String,
    #[serde(default)]
    pub codecs: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DashInfo {
    #[serde(default)]
    pub duration: f64,
    #[serde(rename = "minBufferTime", default)]
    pub min_buffer_time: f64,
    #[serde(default)]
    pub video: Vec<DashStream>,
    /// `null` for silent videos
    pub audio: Option<Vec<DashStream>>,
}

/// One DASH representation (video-only or audio-only)
#[derive(Debug, Clone, Deserialize)]
pub struct DashStream {
    pub id: u32,
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    #[serde(rename = "backupUrl", default)]
    pub backup_url: Option<Vec<String>>,
    #[serde(rename = "mimeType", default)]
    pub mime_type: String,
    #[serde(default)]
    pub codecs: String,
    #[serde(default)]
    pub bandwidth: u64,
    #[serde(default)]
    pub width: u64,
    #[serde(default)]
    pub height: u64,
    #[serde(rename = "frameRate", default)]
    pub frame_rate: String,
}

// ============================================================================
// Related videos
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct RelatedResp {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<Vec<RelatedItem>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelatedItem {
    pub bvid: String,
    #[serde(default)]
    pub aid: u64,
    #[serde(default)]
    pub cid: u64,
    pub title: String,
    #[serde(default)]
    pub pic: String,
    #[serde(default)]
    pub duration: u64,
    pub owner: Option<Owner>,
}

// ============================================================================
// Emotes
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct EmotePanelResp {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<EmotePanelData>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmotePanelData {
    pub packages: Option<Vec<EmotePackage>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EmotePackage {
    #[serde(default)]
    pub text: String,
    pub emote: Option<Vec<Emote>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Emote {
    pub text: String,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dash_play_url() {
        let body = r#"{
            "code": 0,
            "message": "0",
            "data": {
                "quality": 80,
                "accept_quality": [116, 80, 64],
                "accept_description": ["1080P 60帧", "1080P 高清", "720P 高清"],
                "dash": {
                    "duration": 212,
                    "minBufferTime": 1.5,
                    "video": [
                        {"id": 80, "baseUrl": "https://upos/v80.m4s", "backupUrl": null,
                         "mimeType": "video/mp4", "codecs": "avc1.640032", "bandwidth": 2000,
                         "width": 1920, "height": 1080, "frameRate": "30"}
                    ],
                    "audio": [
                        {"id": 30280, "baseUrl": "https://upos/a.m4s", "codecs": "mp4a.40.2"}
                    ]
                }
            }
        }"#;
        let resp: PlayUrlResp = serde_json::from_str(body).unwrap();
        let data = resp.data.unwrap();
        assert_eq!(data.quality, 80);
        let dash = data.dash.unwrap();
        assert_eq!(dash.video[0].id, 80);
        assert_eq!(dash.video[0].base_url, "https://upos/v80.m4s");
        assert!(dash.video[0].backup_url.is_none());
        assert_eq!(dash.audio.unwrap()[0].base_url, "https://upos/a.m4s");
        assert!(data.durl.is_none());
    }

    #[test]
    fn test_parse_dash_stream_with_both_key_spellings() {
        // Live replies carry camelCase and snake_case copies of the same keys
        let body = r#"{
            "code": 0,
            "data": {
                "quality": 80,
                "dash": {
                    "duration": 10,
                    "video": [
                        {"id": 80, "baseUrl": "https://upos/v80.m4s", "base_url": "https://upos/v80.m4s",
                         "backupUrl": ["https://bak/v80.m4s"], "backup_url": ["https://bak/v80.m4s"],
                         "mimeType": "video/mp4", "mime_type": "video/mp4",
                         "frameRate": "29.970", "frame_rate": "29.970",
                         "codecs": "avc1.640032", "bandwidth": 2000, "width": 1920, "height": 1080}
                    ],
                    "audio": [
                        {"id": 30280, "baseUrl": "https://upos/a.m4s", "base_url": "https://upos/a.m4s",
                         "backupUrl": null, "backup_url": null, "codecs": "mp4a.40.2"}
                    ]
                }
            }
        }"#;
        let resp: PlayUrlResp = serde_json::from_str(body).unwrap();
        let dash = resp.data.unwrap().dash.unwrap();
        let video = &dash.video[0];
        assert_eq!(video.base_url, "https://upos/v80.m4s");
        assert_eq!(video.backup_url.as_deref(), Some(&["https://bak/v80.m4s".to_string()][..]));
        assert_eq!(video.mime_type, "video/mp4");
        assert_eq!(video.frame_rate, "29.970");
        assert_eq!(dash.audio.unwrap()[0].base_url, "https://upos/a.m4s");
    }

    #[test]
    fn test_parse_anonymous_nav() {
        let body = r#"{"code":-101,"message":"账号未登录","data":{"isLogin":false,
            "wbi_img":{"img_url":"https://i0.hdslb.com/bfs/wbi/a.png","sub_url":"https://i0.hdslb.com/bfs/wbi/b.png"}}}"#;
        let resp: NavResp = serde_json::from_str(body).unwrap();
        assert_eq!(resp.code, -101);
        let data = resp.data.unwrap();
        assert!(!data.is_login);
        assert_eq!(data.wbi_img.unwrap().sub_url, "https://i0.hdslb.com/bfs/wbi/b.png");
    }
}
