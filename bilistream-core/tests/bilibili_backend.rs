//! End-to-end session tests for the Bilibili adapter against a mock server
//!
//! Run with: cargo test -p bilistream-core --test bilibili_backend

use std::sync::Arc;
use std::time::Duration;

use bilistream_core::bootstrap::{build_backend, open_session};
use bilistream_core::playback::{ClassifiedError, PlaybackError};
use bilistream_core::{Config, SessionState};
use bilistream_providers::bilibili::WbiKeys;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const IMG_URL: &str = "https://i0.hdslb.com/bfs/wbi/7cd084941338484aae1ad9425b84077c.png";
const SUB_URL: &str = "https://i0.hdslb.com/bfs/wbi/4932caff0ff746eab6f01bf08b70ac45.png";
const ROTATED_IMG_URL: &str = "https://i0.hdslb.com/bfs/wbi/0123456789abcdef0123456789abcdef.png";
const ROTATED_SUB_URL: &str = "https://i0.hdslb.com/bfs/wbi/fedcba9876543210fedcba9876543210.png";

fn guest_nav(img_url: &str, sub_url: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "code": -101,
        "message": "账号未登录",
        "data": {"isLogin": false, "wbi_img": {"img_url": img_url, "sub_url": sub_url}}
    }))
}

fn config_for(server: &MockServer) -> Config {
    let mut config = Config::default();
    config.http.api_base = server.uri();
    config.playback.retry_delay_ms = 0;
    config.playback.tier_delay_ms = 0;
    config.playback.switch_retry_delay_ms = 0;
    config
}

async fn mount_common(server: &MockServer, logged_in: bool) {
    Mock::given(method("GET"))
        .and(path("/x/web-interface/nav"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": if logged_in { 0 } else { -101 },
            "message": "0",
            "data": {
                "isLogin": logged_in,
                "uname": if logged_in { "tester" } else { "" },
                "vipStatus": if logged_in { 1 } else { 0 },
                "wbi_img": {"img_url": IMG_URL, "sub_url": SUB_URL}
            }
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/x/web-interface/view"))
        .and(query_param("bvid", "BV1xx411c7XZ"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": {"bvid": "BV1xx411c7XZ", "aid": 1, "cid": 1176840, "title": "test video"}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/x/web-interface/archive/related"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "data": [{"bvid": "BV1yy411c7XZ", "cid": 2, "title": "next", "owner": {"name": "up"}}]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/x/emote/user/panel/web"))
        .respond_with(ResponseTemplate::new(500))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/x/v1/dm/list.so"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            "<?xml version=\"1.0\"?><i></i>",
            "text/xml",
        ))
        .mount(server)
        .await;
}

fn dash_body(qn: u32) -> serde_json::Value {
    json!({
        "code": 0,
        "message": "0",
        "data": {
            "quality": qn,
            "accept_quality": [80, 64, 32],
            "accept_description": ["1080P 高清", "720P 高清", "480P 清晰"],
            "dash": {
                "duration": 60,
                "video": [{
                    "id": qn,
                    "baseUrl": format!("https://upos/v{qn}.m4s"),
                    "base_url": format!("https://upos/v{qn}.m4s"),
                    "backupUrl": [format!("https://bak/v{qn}.m4s")],
                    "backup_url": [format!("https://bak/v{qn}.m4s")],
                    "mimeType": "video/mp4",
                    "mime_type": "video/mp4",
                    "frameRate": "30",
                    "frame_rate": "30",
                    "codecs": "avc1.640032"
                }],
                "audio": [{
                    "id": 30280,
                    "baseUrl": "https://upos/a.m4s",
                    "base_url": "https://upos/a.m4s",
                    "backupUrl": null,
                    "backup_url": null,
                    "codecs": "mp4a.40.2"
                }]
            }
        }
    })
}

#[tokio::test]
async fn test_guest_session_end_to_end() {
    let server = MockServer::start().await;
    mount_common(&server, false).await;

    Mock::given(method("GET"))
        .and(path("/x/player/wbi/playurl"))
        .and(query_param("qn", "80"))
        .and(query_param("cid", "1176840"))
        .and(query_param("fnval", "16"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dash_body(80)))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let backend = Arc::new(build_backend(&config, None).unwrap());
    let target = backend.resolve_target("https://www.bilibili.com/video/BV1xx411c7XZ").await.unwrap();
    let session = open_session(&config, backend).await.unwrap();
    assert!(!session.context().credentials_present);
    assert!(session.context().keys.is_some());

    session.start(target).await.unwrap();

    let state = session.state();
    let ready = state.ready().unwrap();
    assert_eq!(ready.granted_quality, 80);
    assert_eq!(ready.selection.video_url, "https://upos/v80.m4s");
    assert_eq!(ready.manifest.video[0].backup_urls, vec!["https://bak/v80.m4s".to_string()]);
    assert_eq!(ready.related[0].author, "up");
    // Panel failed; built-in emotes remain
    assert_eq!(ready.emotes.len(), 3);

    let mut overlay = session.subscribe_overlay();
    let buffer = tokio::time::timeout(Duration::from_secs(5), overlay.wait_for(Option::is_some))
        .await
        .unwrap()
        .unwrap()
        .clone()
        .unwrap();
    assert!(buffer.starts_with(b"<?xml"));
}

#[tokio::test]
async fn test_risk_control_rejection_descends_chain() {
    let server = MockServer::start().await;
    mount_common(&server, true).await;

    for qn in ["120", "116", "112"] {
        Mock::given(method("GET"))
            .and(path("/x/player/wbi/playurl"))
            .and(query_param("qn", qn))
            .respond_with(ResponseTemplate::new(412))
            .expect(2)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/x/player/wbi/playurl"))
        .and(query_param("qn", "80"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dash_body(80)))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let backend = Arc::new(build_backend(&config, Some("cookie")).unwrap());
    let target = backend.resolve_target("BV1xx411c7XZ").await.unwrap();
    let session = open_session(&config, backend).await.unwrap();
    assert!(session.context().vip);

    session.start(target).await.unwrap();

    assert_eq!(session.state().ready().unwrap().granted_quality, 80);
}

#[tokio::test]
async fn test_not_found_fails_fast() {
    let server = MockServer::start().await;
    mount_common(&server, false).await;

    Mock::given(method("GET"))
        .and(path("/x/player/wbi/playurl"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": -404,
            "message": "啥都木有"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let backend = Arc::new(build_backend(&config, None).unwrap());
    let target = backend.resolve_target("BV1xx411c7XZ").await.unwrap();
    let session = open_session(&config, backend).await.unwrap();

    let err = session.start(target).await.unwrap_err();

    assert_eq!(err, PlaybackError::Classified(ClassifiedError::NotFound));
    assert_eq!(session.state(), SessionState::Failed(err));
}

#[tokio::test]
async fn test_resolve_target_rejects_input_without_bvid() {
    let server = MockServer::start().await;
    let backend = build_backend(&config_for(&server), None).unwrap();

    assert!(backend.resolve_target("https://www.bilibili.com/").await.is_err());
}

#[tokio::test]
async fn test_refresh_keys_picks_up_rotated_pair() {
    let server = MockServer::start().await;
    mount_common(&server, false).await;

    Mock::given(method("GET"))
        .and(path("/x/web-interface/nav"))
        .respond_with(guest_nav(IMG_URL, SUB_URL))
        .up_to_n_times(1)
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/x/web-interface/nav"))
        .respond_with(guest_nav(ROTATED_IMG_URL, ROTATED_SUB_URL))
        .with_priority(2)
        .mount(&server)
        .await;

    let config = config_for(&server);
    let backend = Arc::new(build_backend(&config, None).unwrap());
    let session = open_session(&config, backend).await.unwrap();
    assert_eq!(session.context().keys, Some(WbiKeys::from_urls(IMG_URL, SUB_URL).unwrap()));

    session.refresh_keys().await.unwrap();

    assert_eq!(
        session.context().keys,
        Some(WbiKeys::from_urls(ROTATED_IMG_URL, ROTATED_SUB_URL).unwrap())
    );
}
