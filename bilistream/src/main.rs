use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use bilistream_core::{
    bootstrap::{build_backend, load_config, open_session},
    logging,
    playback::{ClassifiedError, ReadyState},
    SessionState,
};

/// How long to wait for the overlay track after the stream is ready
const OVERLAY_WAIT: Duration = Duration::from_secs(10);

/// Resolve a Bilibili video to playable stream URLs
#[derive(Debug, Parser)]
#[command(name = "bilistream", version, about)]
struct Cli {
    /// Video URL or BV id
    target: String,

    /// Quality code to request instead of the entitled default
    #[arg(long)]
    quality: Option<u32>,

    /// Quality code to switch to once the stream is ready
    #[arg(long)]
    switch_to: Option<u32>,

    /// SESSDATA login cookie
    #[arg(long, env = "BILISTREAM_SESSDATA", hide_env_values = true)]
    sessdata: Option<String>,

    /// Config file path
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = load_config(cli.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("bilistream starting...");

    // 3. Build backend and session
    let backend = Arc::new(build_backend(&config, cli.sessdata.as_deref())?);
    let target = backend.resolve_target(&cli.target).await?;
    let session = Arc::new(open_session(&config, Arc::clone(&backend)).await?);

    let mut notices = session.subscribe_notices();
    let printer = tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(notice) => println!("notice: {notice}"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Dropped notices"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let ctrl_c_session = Arc::clone(&session);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c_session.close();
        }
    });

    // 4. Resolve
    let requested = cli.quality.unwrap_or_else(|| session.default_quality());
    let mut result = session.start_at(target.clone(), requested).await;
    if result
        .as_ref()
        .is_err_and(|e| e.classified() == Some(&ClassifiedError::SignatureRejected))
    {
        // Keys may have rotated since the nav lookup
        warn!("Signature rejected, refreshing signing keys");
        session.refresh_keys().await?;
        result = session.start_at(target, requested).await;
    }
    if let Err(e) = result {
        eprintln!("{}", e.user_message());
        return Err(e.into());
    }
    print_state(&session.state())?;

    // 5. Optional quality switch, resuming from the start
    if let Some(tier) = cli.switch_to {
        session.change_quality(tier, Duration::ZERO).await;
        print_state(&session.state())?;
    }

    // 6. Overlay arrives on its own schedule
    let mut overlay = session.subscribe_overlay();
    match tokio::time::timeout(OVERLAY_WAIT, overlay.wait_for(Option::is_some)).await {
        Ok(Ok(buffer)) => {
            let size = (*buffer).as_ref().map_or(0, |b| b.len());
            println!("overlay: {size} bytes");
        }
        Ok(Err(_)) | Err(_) => println!("overlay: unavailable"),
    }

    session.close();
    drop(session);
    printer.abort();
    Ok(())
}

fn print_state(state: &SessionState) -> Result<()> {
    match state {
        SessionState::Ready(ready) => print_ready(ready),
        SessionState::Loading => {
            println!("state: loading");
            Ok(())
        }
        SessionState::Failed(e) => {
            println!("state: failed ({})", e.user_message());
            Ok(())
        }
    }
}

fn print_ready(ready: &ReadyState) -> Result<()> {
    let summary = serde_json::json!({
        "bvid": ready.target.bvid,
        "cid": ready.target.cid,
        "granted_quality": ready.granted_quality,
        "accept_quality": ready.manifest.accept_quality,
        "logged_in": ready.logged_in,
        "selection": ready.selection,
        "related": ready.related.len(),
        "emotes": ready.emotes.len(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
