//! Playback session state machine
//!
//! Sequences negotiation, stream selection and overlay decoding for one
//! video, and publishes the result on three channels:
//! - a `watch` of [`SessionState`] for the UI
//! - a lossy `broadcast` of [`Notice`]s
//! - a `watch` of the decoded overlay buffer, filled in whenever it arrives

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use bilistream_providers::bilibili::WbiKeys;
use bytes::Bytes;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::classifier::{classify, ClassifiedError, PlaybackError};
use super::negotiator::{NegotiationPolicy, QualityNegotiator};
use super::notice::Notice;
use super::overlay;
use super::resolver::{StreamResolver, StreamSelection};
use crate::logging::generate_trace_id;
use crate::models::{label_for_code, EmoteTable, Manifest, QualityTier, RelatedVideo, VideoTarget};
use crate::provider::{PlaybackBackend, SessionContext};

/// Session-level settings outside the negotiation policy
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Starting tier for callers with credentials
    pub logged_in_quality: QualityTier,
    /// Buffered notices per subscriber before the oldest are dropped
    pub notice_capacity: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self { logged_in_quality: QualityTier::K4, notice_capacity: 16 }
    }
}

/// Everything the player needs once a stream is resolved
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyState {
    pub target: VideoTarget,
    pub manifest: Manifest,
    pub selection: StreamSelection,
    /// Where the player should seek after (re)loading the stream
    pub position: Duration,
    pub is_switching: bool,
    /// Tier of the switch in progress
    pub requested_quality: Option<u32>,
    pub emotes: EmoteTable,
    pub related: Vec<RelatedVideo>,
    pub granted_quality: u32,
    pub logged_in: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Loading,
    Ready(Box<ReadyState>),
    Failed(PlaybackError),
}

impl SessionState {
    #[must_use]
    pub fn ready(&self) -> Option<&ReadyState> {
        match self {
            Self::Ready(ready) => Some(ready),
            _ => None,
        }
    }
}

pub struct PlaybackSession<B: ?Sized> {
    id: String,
    backend: Arc<B>,
    negotiator: QualityNegotiator<B>,
    resolver: StreamResolver,
    /// Entitlement and keys; keys are replaced by `set_keys` / `refresh_keys`
    ctx: RwLock<SessionContext>,
    options: SessionOptions,
    state: watch::Sender<SessionState>,
    notices: broadcast::Sender<Notice>,
    overlay: Arc<watch::Sender<Option<Bytes>>>,
    cancel: CancellationToken,
    /// Token of the overlay task spawned by the latest `start`
    overlay_task: Mutex<Option<CancellationToken>>,
}

impl<B: PlaybackBackend + ?Sized + 'static> PlaybackSession<B> {
    pub fn new(
        backend: Arc<B>,
        ctx: SessionContext,
        policy: NegotiationPolicy,
        resolver: StreamResolver,
        options: SessionOptions,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Loading);
        let (notices, _) = broadcast::channel(options.notice_capacity.max(1));
        let (overlay, _) = watch::channel(None);

        Self {
            id: generate_trace_id(),
            negotiator: QualityNegotiator::new(Arc::clone(&backend), policy),
            backend,
            resolver,
            ctx: RwLock::new(ctx),
            options,
            state,
            notices,
            overlay: Arc::new(overlay),
            cancel: CancellationToken::new(),
            overlay_task: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Snapshot of the caller context
    #[must_use]
    pub fn context(&self) -> SessionContext {
        self.ctx.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Replace the signing keys used by every later negotiation
    pub fn set_keys(&self, keys: WbiKeys) {
        self.ctx.write().unwrap_or_else(PoisonError::into_inner).keys = Some(keys);
    }

    /// Fetch a fresh signing key pair from the backend and install it
    ///
    /// Keys are otherwise kept for the life of the session. On failure the
    /// current keys stay in place.
    pub async fn refresh_keys(&self) -> Result<(), PlaybackError> {
        let fetched = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(PlaybackError::Cancelled),
            fetched = self.backend.signing_keys() => fetched,
        };
        match fetched {
            Ok(keys) => {
                info!(session = %self.id, "Signing keys refreshed");
                self.set_keys(keys);
                Ok(())
            }
            Err(outcome) => {
                let error = classify(&outcome);
                warn!(session = %self.id, %outcome, "Failed to refresh signing keys");
                Err(error.into())
            }
        }
    }

    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    #[must_use]
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.notices.subscribe()
    }

    #[must_use]
    pub fn subscribe_overlay(&self) -> watch::Receiver<Option<Bytes>> {
        self.overlay.subscribe()
    }

    /// Snapshot of the current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Tier requested when a video is first opened
    #[must_use]
    pub fn default_quality(&self) -> u32 {
        if self.context().credentials_present {
            self.options.logged_in_quality.code()
        } else {
            self.negotiator.policy().guest_ceiling.code()
        }
    }

    /// Load `target` at the entitled default tier and publish Ready or Failed
    pub async fn start(&self, target: VideoTarget) -> Result<(), PlaybackError> {
        self.start_at(target, self.default_quality()).await
    }

    /// Like [`start`](Self::start), requesting `requested` instead of the default
    pub async fn start_at(&self, target: VideoTarget, requested: u32) -> Result<(), PlaybackError> {
        info!(session = %self.id, bvid = %target.bvid, cid = target.cid, requested, "Starting playback");
        let ctx = self.context();
        self.state.send_replace(SessionState::Loading);
        self.overlay.send_replace(None);

        if target.cid == 0 {
            return self.fail(ClassifiedError::StreamIdMissing.into());
        }

        self.spawn_overlay(target.cid);

        let (manifest, related, emotes) = tokio::join!(
            self.negotiator.resolve(&target, requested, &ctx, &self.cancel),
            self.backend.related_videos(&target.bvid),
            self.backend.emote_table(),
        );

        let manifest = match manifest {
            Ok(manifest) => manifest,
            Err(e) => return self.fail(e),
        };
        let selection = match self.resolver.select(&manifest, requested) {
            Ok(selection) => selection,
            Err(e) => return self.fail(e),
        };

        let related = related.unwrap_or_else(|outcome| {
            warn!(session = %self.id, %outcome, "Failed to load related videos");
            Vec::new()
        });
        let emotes = emotes.unwrap_or_else(|outcome| {
            warn!(session = %self.id, %outcome, "Failed to load emotes");
            EmoteTable::new()
        });

        info!(
            session = %self.id,
            requested,
            granted = selection.granted_quality,
            adaptive = manifest.is_adaptive(),
            "Playback ready"
        );
        self.state.send_replace(SessionState::Ready(Box::new(ReadyState {
            target,
            granted_quality: selection.granted_quality,
            manifest,
            selection,
            position: Duration::ZERO,
            is_switching: false,
            requested_quality: None,
            emotes,
            related,
            logged_in: ctx.credentials_present,
        })));
        Ok(())
    }

    /// Switch the running session to `tier`, resuming at `position`
    ///
    /// Never fails the session; problems surface as notices.
    pub async fn change_quality(&self, tier: u32, position: Duration) {
        let mut rejection = None;
        let mut target = None;

        self.state.send_if_modified(|state| {
            let SessionState::Ready(ready) = state else {
                return false;
            };
            if ready.is_switching {
                rejection = Some(Notice::AlreadySwitching);
                return false;
            }
            if ready.granted_quality == tier {
                rejection = Some(Notice::AlreadyAtQuality { label: label(&ready.manifest, tier) });
                return false;
            }
            ready.is_switching = true;
            ready.requested_quality = Some(tier);
            target = Some(ready.target.clone());
            true
        });

        if let Some(notice) = rejection {
            debug!(session = %self.id, tier, %notice, "Quality change rejected");
            self.notify(notice);
            return;
        }
        let Some(target) = target else {
            debug!(session = %self.id, tier, "Quality change ignored, session not ready");
            return;
        };

        info!(session = %self.id, tier, position_ms = position.as_millis(), "Changing quality");
        let ctx = self.context();
        let result = match self
            .negotiator
            .resolve_pinned(&target, tier, &ctx, &self.cancel)
            .await
        {
            Ok(manifest) => self
                .resolver
                .select(&manifest, tier)
                .map(|selection| (manifest, selection)),
            Err(e) => Err(e),
        };

        match result {
            Ok((manifest, selection)) => {
                let granted = selection.granted_quality;
                let notice = if granted == tier {
                    Notice::Switched { label: label(&manifest, granted) }
                } else {
                    self.downgrade_notice(&ctx, &manifest, tier, granted)
                };

                self.state.send_modify(|state| {
                    if let SessionState::Ready(ready) = state {
                        ready.manifest = manifest;
                        ready.selection = selection;
                        ready.granted_quality = granted;
                        ready.position = position;
                        ready.is_switching = false;
                        ready.requested_quality = None;
                    }
                });
                info!(session = %self.id, requested = tier, granted, "Quality changed");
                self.notify(notice);
            }
            Err(e) => {
                warn!(session = %self.id, tier, error = %e, "Quality change failed");
                self.clear_switching();
                if e != PlaybackError::Cancelled {
                    self.notify(Notice::SwitchFailed { reason: e.user_message() });
                }
            }
        }
    }

    /// Cancel in-flight negotiation and the overlay task
    pub fn close(&self) {
        if !self.cancel.is_cancelled() {
            info!(session = %self.id, "Closing playback session");
        }
        self.cancel.cancel();
    }

    fn fail(&self, error: PlaybackError) -> Result<(), PlaybackError> {
        warn!(session = %self.id, error = %error, "Playback failed");
        self.state.send_replace(SessionState::Failed(error.clone()));
        Err(error)
    }

    fn clear_switching(&self) {
        self.state.send_if_modified(|state| match state {
            SessionState::Ready(ready) if ready.is_switching => {
                ready.is_switching = false;
                ready.requested_quality = None;
                true
            }
            _ => false,
        });
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }

    fn downgrade_notice(
        &self,
        ctx: &SessionContext,
        manifest: &Manifest,
        requested: u32,
        granted: u32,
    ) -> Notice {
        let requested_label = label(manifest, requested);
        let granted_label = label(manifest, granted);
        if ctx.is_entitled_to(requested, self.negotiator.policy().guest_ceiling) {
            Notice::TransientDowngrade { requested: requested_label, granted: granted_label }
        } else {
            Notice::EntitlementDowngrade { requested: requested_label, granted: granted_label }
        }
    }

    fn spawn_overlay(&self, cid: u64) {
        let token = self.cancel.child_token();
        let previous = self
            .overlay_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(token.clone());
        if let Some(previous) = previous {
            previous.cancel();
        }

        let backend = Arc::clone(&self.backend);
        let overlay = Arc::clone(&self.overlay);
        let session = self.id.clone();

        tokio::spawn(async move {
            let fetched = tokio::select! {
                biased;
                () = token.cancelled() => return,
                fetched = backend.overlay_bytes(cid) => fetched,
            };
            let raw = match fetched {
                Ok(raw) => raw,
                Err(outcome) => {
                    warn!(session = %session, cid, %outcome, "Failed to fetch overlay");
                    return;
                }
            };
            match overlay::decode(raw) {
                Ok(decoded) if !token.is_cancelled() => {
                    debug!(session = %session, cid, bytes = decoded.len(), "Overlay ready");
                    overlay.send_replace(Some(decoded));
                }
                Ok(_) => {}
                Err(e) => debug!(session = %session, cid, error = %e, "No overlay"),
            }
        });
    }
}

impl<B: ?Sized> Drop for PlaybackSession<B> {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn label(manifest: &Manifest, code: u32) -> String {
    manifest
        .label_for(code)
        .map_or_else(|| label_for_code(code), str::to_string)
}
