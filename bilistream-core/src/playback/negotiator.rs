//! Quality negotiation
//!
//! Walks the quality chain from the caller's entitled starting tier downward,
//! signing every attempt, until the backend hands out a playable manifest.
//! Each tier gets one retry on a retryable failure before descending.

use std::sync::Arc;
use std::time::Duration;

use bilistream_providers::bilibili::{sign, SignedRequest, WbiKeys};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::classifier::{classify, ClassifiedError, PlaybackError};
use crate::models::{label_for_code, Manifest, QualityChain, QualityTier, VideoTarget};
use crate::provider::{ManifestSource, SessionContext};

/// Attempts per tier: the first request plus one retry
const ATTEMPTS_PER_TIER: usize = 2;

/// Timing and chain settings for negotiation
#[derive(Debug, Clone)]
pub struct NegotiationPolicy {
    pub chain: QualityChain,
    /// Delay before retrying the same tier
    pub retry_delay: Duration,
    /// Delay before descending to the next tier
    pub tier_delay: Duration,
    /// Delay before retrying a pinned (quality switch) request
    pub switch_retry_delay: Duration,
    /// Highest tier requested on behalf of anonymous callers
    pub guest_ceiling: QualityTier,
}

impl Default for NegotiationPolicy {
    fn default() -> Self {
        Self {
            chain: QualityChain::default(),
            retry_delay: Duration::from_millis(1500),
            tier_delay: Duration::from_millis(1500),
            switch_retry_delay: Duration::from_secs(2),
            guest_ceiling: QualityTier::GUEST_CEILING,
        }
    }
}

/// Why a single tier produced no manifest
enum TierFailure {
    /// Stop negotiating
    Abort(PlaybackError),
    /// Tier is spent; carry the last classified error if there was one
    Exhausted(Option<ClassifiedError>),
}

pub struct QualityNegotiator<S: ?Sized> {
    source: Arc<S>,
    policy: NegotiationPolicy,
}

impl<S: ManifestSource + ?Sized> QualityNegotiator<S> {
    pub fn new(source: Arc<S>, policy: NegotiationPolicy) -> Self {
        Self { source, policy }
    }

    #[must_use]
    pub const fn policy(&self) -> &NegotiationPolicy {
        &self.policy
    }

    /// Clamp a request to what the caller may ask for
    #[must_use]
    pub fn clamp_request(&self, requested: u32, ctx: &SessionContext) -> u32 {
        if ctx.credentials_present {
            requested
        } else {
            requested.min(self.policy.guest_ceiling.code())
        }
    }

    /// Chain position the negotiation starts from
    #[must_use]
    pub fn start_index(&self, requested: u32, ctx: &SessionContext) -> usize {
        self.policy.chain.start_index(self.clamp_request(requested, ctx))
    }

    /// Negotiate the best playable manifest at or below `requested`
    pub async fn resolve(
        &self,
        target: &VideoTarget,
        requested: u32,
        ctx: &SessionContext,
        cancel: &CancellationToken,
    ) -> Result<Manifest, PlaybackError> {
        let keys = ctx.keys.as_ref().ok_or(PlaybackError::MissingSigningKeys)?;
        let chain = &self.policy.chain;
        let mut index = self.start_index(requested, ctx);
        let mut last_error = None;

        info!(
            bvid = %target.bvid,
            cid = target.cid,
            requested,
            start = chain.get(index).map_or(0, QualityTier::code),
            "Negotiating quality"
        );

        while let Some(tier) = chain.get(index) {
            match self
                .resolve_tier(target, tier.code(), keys, self.policy.retry_delay, cancel)
                .await
            {
                Ok(manifest) => return Ok(manifest),
                Err(TierFailure::Abort(e)) => return Err(e),
                Err(TierFailure::Exhausted(e)) => {
                    if e.is_some() {
                        last_error = e;
                    }
                }
            }

            index += 1;
            if let Some(next) = chain.get(index) {
                info!(from = tier.code(), to = next.code(), "Descending to lower quality");
                sleep_or_cancel(self.policy.tier_delay, cancel).await?;
            }
        }

        let error = last_error.unwrap_or(ClassifiedError::Unknown);
        warn!(bvid = %target.bvid, error = %error, "Quality chain exhausted");
        Err(error.into())
    }

    /// Request exactly one tier, retrying once, without descending
    ///
    /// Used for user-initiated quality switches; the backend lowers the grant
    /// itself when entitlement is missing.
    pub async fn resolve_pinned(
        &self,
        target: &VideoTarget,
        tier: u32,
        ctx: &SessionContext,
        cancel: &CancellationToken,
    ) -> Result<Manifest, PlaybackError> {
        let keys = ctx.keys.as_ref().ok_or(PlaybackError::MissingSigningKeys)?;
        let qn = self.clamp_request(tier, ctx);
        info!(bvid = %target.bvid, cid = target.cid, qn, "Requesting pinned quality");

        match self
            .resolve_tier(target, qn, keys, self.policy.switch_retry_delay, cancel)
            .await
        {
            Ok(manifest) => Ok(manifest),
            Err(TierFailure::Abort(e)) => Err(e),
            Err(TierFailure::Exhausted(e)) => Err(e.unwrap_or(ClassifiedError::Unknown).into()),
        }
    }

    async fn resolve_tier(
        &self,
        target: &VideoTarget,
        qn: u32,
        keys: &WbiKeys,
        retry_delay: Duration,
        cancel: &CancellationToken,
    ) -> Result<Manifest, TierFailure> {
        let mut last_error = None;

        for attempt in 0..ATTEMPTS_PER_TIER {
            if attempt > 0 {
                debug!(qn, delay_ms = retry_delay.as_millis(), "Retrying same quality");
                sleep_or_cancel(retry_delay, cancel)
                    .await
                    .map_err(TierFailure::Abort)?;
            }
            if cancel.is_cancelled() {
                return Err(TierFailure::Abort(PlaybackError::Cancelled));
            }

            let request = manifest_request(target, qn, keys);
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(TierFailure::Abort(PlaybackError::Cancelled)),
                result = self.source.fetch_manifest(&request) => result,
            };

            match result {
                Ok(manifest) if manifest.is_playable() => {
                    info!(
                        requested = qn,
                        granted = manifest.granted_quality,
                        label = %label_for_code(manifest.granted_quality),
                        "Manifest resolved"
                    );
                    return Ok(manifest);
                }
                Ok(_) => {
                    warn!(qn, attempt, "Manifest has no usable stream");
                }
                Err(outcome) => {
                    let classified = classify(&outcome);
                    if !classified.retryable() {
                        warn!(qn, %outcome, error = %classified, "Non-retryable failure");
                        return Err(TierFailure::Abort(classified.into()));
                    }
                    warn!(qn, attempt, %outcome, error = %classified, "Retryable failure");
                    last_error = Some(classified);
                }
            }
        }

        Err(TierFailure::Exhausted(last_error))
    }
}

/// Signed play-url parameters for one attempt
///
/// `fnval=16` asks for DASH, `fourk=1` unlocks 4K entries.
#[must_use]
pub fn manifest_request(target: &VideoTarget, qn: u32, keys: &WbiKeys) -> SignedRequest {
    let cid = target.cid.to_string();
    let qn = qn.to_string();
    let params = [
        ("bvid", target.bvid.as_str()),
        ("cid", cid.as_str()),
        ("qn", qn.as_str()),
        ("fnval", "16"),
        ("fnver", "0"),
        ("fourk", "1"),
        ("platform", "html5"),
        ("high_quality", "1"),
    ];
    sign(params, keys, chrono::Utc::now().timestamp())
}

/// Suspend for `delay` unless the token fires first
pub(crate) async fn sleep_or_cancel(
    delay: Duration,
    cancel: &CancellationToken,
) -> Result<(), PlaybackError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(PlaybackError::Cancelled),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Representation;
    use crate::playback::TransportOutcome;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn keys() -> WbiKeys {
        WbiKeys::new("7cd084941338484aae1ad9425b84077c", "4932caff0ff746eab6f01bf08b70ac45").unwrap()
    }

    fn playable(qn: u32) -> Manifest {
        Manifest {
            video: vec![Representation {
                id: qn,
                base_url: format!("https://upos/v{qn}.m4s"),
                backup_urls: Vec::new(),
                codecs: "avc1.640032".to_string(),
                bandwidth: 0,
                width: 0,
                height: 0,
            }],
            granted_quality: qn,
            ..Default::default()
        }
    }

    /// Replies by `qn`; records every requested `qn`
    struct ScriptedSource {
        reply: fn(u32) -> Result<Manifest, TransportOutcome>,
        calls: Mutex<Vec<u32>>,
    }

    #[async_trait]
    impl ManifestSource for ScriptedSource {
        async fn fetch_manifest(&self, request: &SignedRequest) -> Result<Manifest, TransportOutcome> {
            let qn: u32 = request.get("qn").unwrap().parse().unwrap();
            assert!(!request.w_rid().is_empty());
            self.calls.lock().unwrap().push(qn);
            (self.reply)(qn)
        }
    }

    fn negotiator(
        reply: fn(u32) -> Result<Manifest, TransportOutcome>,
    ) -> (QualityNegotiator<ScriptedSource>, Arc<ScriptedSource>) {
        let source = Arc::new(ScriptedSource { reply, calls: Mutex::new(Vec::new()) });
        (QualityNegotiator::new(source.clone(), NegotiationPolicy::default()), source)
    }

    fn member() -> SessionContext {
        SessionContext::guest().with_credentials(true).with_vip(true).with_keys(keys())
    }

    fn target() -> VideoTarget {
        VideoTarget::new("BV1xx411c7XZ", 12345)
    }

    #[tokio::test(start_paused = true)]
    async fn test_descends_after_retry() {
        let (negotiator, source) = negotiator(|qn| match qn {
            120 | 116 => Err(TransportOutcome::backend(-502, "bad gateway")),
            _ => Ok(playable(qn)),
        });
        let started = tokio::time::Instant::now();

        let manifest = negotiator
            .resolve(&target(), 120, &member(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(manifest.granted_quality, 112);
        assert_eq!(*source.calls.lock().unwrap(), vec![120, 120, 116, 116, 112]);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(6000) && elapsed < Duration::from_millis(6100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_aborts_chain() {
        let (negotiator, source) =
            negotiator(|_| Err(TransportOutcome::backend(-404, "啥都木有")));

        let err = negotiator
            .resolve(&target(), 80, &member(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, PlaybackError::Classified(ClassifiedError::NotFound));
        assert_eq!(*source.calls.lock().unwrap(), vec![80]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_chain_returns_last_error() {
        let (negotiator, source) = negotiator(|qn| {
            if qn == 16 {
                Err(TransportOutcome::backend(-504, "timeout"))
            } else {
                Err(TransportOutcome::http(412))
            }
        });

        let err = negotiator
            .resolve(&target(), 32, &member(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PlaybackError::Classified(ClassifiedError::Backend { code: -504, .. })
        ));
        assert_eq!(*source.calls.lock().unwrap(), vec![32, 32, 16, 16]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_manifests_exhaust_to_unknown() {
        let (negotiator, _) = negotiator(|_| Ok(Manifest::default()));

        let err = negotiator
            .resolve(&target(), 16, &member(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, PlaybackError::Classified(ClassifiedError::Unknown));
    }

    #[tokio::test(start_paused = true)]
    async fn test_guest_starts_at_ceiling() {
        let (negotiator, source) = negotiator(|qn| Ok(playable(qn)));
        let guest = SessionContext::guest().with_keys(keys());

        assert_eq!(negotiator.start_index(120, &guest), 3);
        negotiator
            .resolve(&target(), 120, &guest, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*source.calls.lock().unwrap(), vec![80]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_request_maps_onto_chain() {
        let (negotiator, source) = negotiator(|qn| Ok(playable(qn)));

        negotiator
            .resolve(&target(), 74, &member(), &CancellationToken::new())
            .await
            .unwrap();
        negotiator
            .resolve(&target(), 6, &member(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*source.calls.lock().unwrap(), vec![64, 16]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_higher_grant_is_accepted() {
        let (negotiator, _) = negotiator(|_| Ok(playable(116)));

        let manifest = negotiator
            .resolve(&target(), 80, &member(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(manifest.granted_quality, 116);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_keys_short_circuits() {
        let (negotiator, source) = negotiator(|qn| Ok(playable(qn)));
        let ctx = SessionContext::guest().with_credentials(true);

        let err = negotiator
            .resolve(&target(), 80, &ctx, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err, PlaybackError::MissingSigningKeys);
        assert!(source.calls.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let (negotiator, source) = negotiator(|_| Err(TransportOutcome::http(412)));
        let cancel = CancellationToken::new();

        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            canceller.cancel();
        });

        let err = negotiator.resolve(&target(), 120, &member(), &cancel).await.unwrap_err();

        assert_eq!(err, PlaybackError::Cancelled);
        assert_eq!(*source.calls.lock().unwrap(), vec![120]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pinned_retries_once_without_descent() {
        let (negotiator, source) = negotiator(|_| Err(TransportOutcome::backend(-500, "busy")));
        let started = tokio::time::Instant::now();

        let err = negotiator
            .resolve_pinned(&target(), 116, &member(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            PlaybackError::Classified(ClassifiedError::Backend { code: -500, .. })
        ));
        assert_eq!(*source.calls.lock().unwrap(), vec![116, 116]);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(2) && elapsed < Duration::from_millis(2100));
    }

    #[test]
    fn test_manifest_request_params() {
        let request = manifest_request(&target(), 80, &keys());
        assert_eq!(request.get("bvid"), Some("BV1xx411c7XZ"));
        assert_eq!(request.get("cid"), Some("12345"));
        assert_eq!(request.get("qn"), Some("80"));
        assert_eq!(request.get("fnval"), Some("16"));
        assert_eq!(request.get("fourk"), Some("1"));
        assert!(request.wts().is_some());
    }
}
