//! Bilibili HTTP Client

use std::collections::HashMap;
use std::sync::LazyLock;
use std::time::Duration;

use bytes::Bytes;
use regex::Regex;
use reqwest::Client;
use tracing::debug;

use super::error::{bytes_with_limit, check_response, json_with_limit, BilibiliError};
use super::types::{
    self as types, DashInfo, Emote, NavData, PlayUrlData, RelatedItem, ViewData,
};
use super::wbi::{SignedRequest, WbiKeys};

// These patterns are compile-time constants; Regex::new cannot fail on them.
static RE_BVID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"BV[a-zA-Z0-9]{10}").expect("invalid BVID regex"));

pub const DEFAULT_API_BASE: &str = "https://api.bilibili.com";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";
pub const DEFAULT_REFERER: &str = "https://www.bilibili.com";

/// Cookie that marks an authenticated web session
pub const SESSION_COOKIE: &str = "SESSDATA";

/// Shared HTTP client for default-configured Bilibili clients (connection pooling)
/// Redirects are disabled to prevent SSRF via redirect to private IPs.
static SHARED_CLIENT: LazyLock<Client> = LazyLock::new(|| {
    build_http_client(&ClientOptions::default()).expect("Failed to build Bilibili shared HTTP client")
});

/// Endpoint and transport settings
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_base: String,
    pub user_agent: String,
    pub referer: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            referer: DEFAULT_REFERER.to_string(),
            connect_timeout: Duration::from_secs(10),
            timeout: Duration::from_secs(30),
        }
    }
}

fn build_http_client(options: &ClientOptions) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(options.user_agent.as_str())
        .connect_timeout(options.connect_timeout)
        .timeout(options.timeout)
        .pool_max_idle_per_host(10)
        .redirect(reqwest::redirect::Policy::none())
        .build()
}

/// Bilibili HTTP Client
#[derive(Clone)]
pub struct BilibiliClient {
    client: Client,
    api_base: String,
    referer: String,
    cookies: Option<HashMap<String, String>>,
}

impl BilibiliClient {
    /// Create a new Bilibili client (reuses shared connection pool)
    pub fn new() -> Result<Self, BilibiliError> {
        let options = ClientOptions::default();
        Ok(Self {
            client: SHARED_CLIENT.clone(),
            api_base: options.api_base,
            referer: options.referer,
            cookies: None,
        })
    }

    /// Create a client with custom endpoints and timeouts (own connection pool)
    pub fn with_options(options: ClientOptions) -> Result<Self, BilibiliError> {
        if options.api_base.is_empty() {
            return Err(BilibiliError::InvalidConfig("api_base is empty".to_string()));
        }
        let client = build_http_client(&options)?;
        Ok(Self {
            client,
            api_base: options.api_base.trim_end_matches('/').to_string(),
            referer: options.referer,
            cookies: None,
        })
    }

    /// Attach login cookies (SESSDATA, bili_jct, ...)
    #[must_use]
    pub fn with_cookies(mut self, cookies: HashMap<String, String>) -> Self {
        self.cookies = if cookies.is_empty() { None } else { Some(cookies) };
        self
    }

    /// Whether a session cookie is attached
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.cookies
            .as_ref()
            .and_then(|c| c.get(SESSION_COOKIE))
            .is_some_and(|v| !v.is_empty())
    }

    /// Add cookies to request
    fn add_cookies(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(cookies) = &self.cookies {
            let mut pairs: Vec<_> = cookies.iter().map(|(k, v)| format!("{k}={v}")).collect();
            pairs.sort();
            req.header("Cookie", pairs.join("; "))
        } else {
            req
        }
    }

    fn get(&self, path_and_query: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{path_and_query}", self.api_base);
        self.add_cookies(self.client.get(url).header("Referer", &self.referer))
    }

    /// Extract BVID from URL
    #[must_use]
    pub fn extract_bvid(url: &str) -> Option<String> {
        RE_BVID.find(url).map(|m| m.as_str().to_string())
    }

    /// Get login state and the WBI key URLs
    ///
    /// Anonymous sessions answer with -101 and are not an error here.
    pub async fn nav_info(&self) -> Result<NavData, BilibiliError> {
        let resp = check_response(self.get("/x/web-interface/nav").send().await?)?;
        let json: types::NavResp = json_with_limit(resp).await?;

        if json.code != 0 && json.code != -101 {
            return Err(BilibiliError::Api { code: json.code, message: json.message });
        }

        json.data.ok_or_else(|| BilibiliError::Parse("Missing nav data".to_string()))
    }

    /// Fetch the nav endpoint and derive the signing keys from it
    pub async fn wbi_keys(&self) -> Result<WbiKeys, BilibiliError> {
        let nav = self.nav_info().await?;
        let img = nav.wbi_img.ok_or(BilibiliError::MissingSigningKeys)?;
        WbiKeys::from_urls(&img.img_url, &img.sub_url)
    }

    /// Get video metadata (including the default page's cid) by BVID
    pub async fn video_view(&self, bvid: &str) -> Result<ViewData, BilibiliError> {
        let resp = check_response(
            self.get(&format!("/x/web-interface/view?bvid={bvid}")).send().await?,
        )?;
        let json: types::ViewResp = json_with_limit(resp).await?;

        if json.code != 0 {
            return Err(BilibiliError::Api { code: json.code, message: json.message });
        }

        json.data.ok_or_else(|| BilibiliError::Parse("Missing view data".to_string()))
    }

    /// Get playback URLs with a WBI-signed query
    pub async fn play_url(&self, request: &SignedRequest) -> Result<PlayUrlData, BilibiliError> {
        let path = format!("/x/player/wbi/playurl?{}", request.query_string());
        debug!(qn = request.get("qn").unwrap_or_default(), "Requesting play url");

        let resp = check_response(self.get(&path).send().await?)?;
        let json: types::PlayUrlResp = json_with_limit(resp).await?;

        if json.code != 0 {
            return Err(BilibiliError::Api { code: json.code, message: json.message });
        }

        let data = json.data.ok_or_else(|| BilibiliError::Parse("Missing play url data".to_string()))?;
        debug!(
            quality = data.quality,
            durl = data.durl.as_ref().map_or(0, Vec::len),
            dash_video = data.dash.as_ref().map_or(0, |d: &DashInfo| d.video.len()),
            "Play url response"
        );
        Ok(data)
    }

    /// Get related videos
    pub async fn related(&self, bvid: &str) -> Result<Vec<RelatedItem>, BilibiliError> {
        let resp = check_response(
            self.get(&format!("/x/web-interface/archive/related?bvid={bvid}")).send().await?,
        )?;
        let json: types::RelatedResp = json_with_limit(resp).await?;

        if json.code != 0 {
            return Err(BilibiliError::Api { code: json.code, message: json.message });
        }

        Ok(json.data.unwrap_or_default())
    }

    /// Download the raw danmaku payload for a cid
    ///
    /// The body is either XML or raw-deflate compressed XML.
    pub async fn danmaku_raw(&self, cid: u64) -> Result<Bytes, BilibiliError> {
        let resp = check_response(self.get(&format!("/x/v1/dm/list.so?oid={cid}")).send().await?)?;
        bytes_with_limit(resp).await
    }

    /// Get the reply emote panel, flattened across packages
    pub async fn emote_panel(&self) -> Result<Vec<Emote>, BilibiliError> {
        let resp = check_response(
            self.get("/x/emote/user/panel/web?business=reply").send().await?,
        )?;
        let json: types::EmotePanelResp = json_with_limit(resp).await?;

        if json.code != 0 {
            return Err(BilibiliError::Api { code: json.code, message: json.message });
        }

        Ok(json
            .data
            .and_then(|d| d.packages)
            .unwrap_or_default()
            .into_iter()
            .flat_map(|pkg| pkg.emote.unwrap_or_default())
            .collect())
    }
}
