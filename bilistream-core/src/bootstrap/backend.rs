//! Backend and session construction

use std::collections::HashMap;
use std::sync::Arc;

use bilistream_providers::bilibili::client::SESSION_COOKIE;
use bilistream_providers::BilibiliClient;
use tracing::info;

use crate::playback::PlaybackSession;
use crate::provider::BilibiliBackend;
use crate::{Config, Result};

/// Build the Bilibili backend from configuration
///
/// `sessdata` overrides the configured login cookie.
pub fn build_backend(config: &Config, sessdata: Option<&str>) -> Result<BilibiliBackend> {
    let client = BilibiliClient::with_options(config.client_options())?;

    let cookie = sessdata
        .map(str::to_string)
        .or_else(|| config.http.sessdata.clone())
        .filter(|v| !v.is_empty());
    let client = match cookie {
        Some(value) => {
            info!("Using login cookie");
            client.with_cookies(HashMap::from([(SESSION_COOKIE.to_string(), value)]))
        }
        None => client,
    };

    Ok(BilibiliBackend::new(client))
}

/// Fetch the session context and wire up a playback session
pub async fn open_session(
    config: &Config,
    backend: Arc<BilibiliBackend>,
) -> Result<PlaybackSession<BilibiliBackend>> {
    let ctx = backend.session_context().await?;
    Ok(PlaybackSession::new(
        backend,
        ctx,
        config.negotiation_policy()?,
        config.stream_resolver()?,
        config.session_options()?,
    ))
}
