// Session Context
//
// Per-session entitlement and signing state, passed explicitly into every
// negotiation call

use bilistream_providers::bilibili::WbiKeys;

use crate::models::QualityTier;

/// Caller entitlement plus the signing keys for this session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    /// A session cookie is attached
    pub credentials_present: bool,

    /// The account holds a premium membership
    pub vip: bool,

    /// WBI keys from the nav endpoint; `None` until fetched
    pub keys: Option<WbiKeys>,
}

impl SessionContext {
    /// Anonymous context without keys
    #[must_use]
    pub const fn guest() -> Self {
        Self { credentials_present: false, vip: false, keys: None }
    }

    /// Set whether credentials are present
    #[must_use]
    pub const fn with_credentials(mut self, present: bool) -> Self {
        self.credentials_present = present;
        self
    }

    /// Set membership flag
    #[must_use]
    pub const fn with_vip(mut self, vip: bool) -> Self {
        self.vip = vip;
        self
    }

    /// Attach signing keys
    #[must_use]
    pub fn with_keys(mut self, keys: WbiKeys) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Whether this caller is entitled to `tier` at all
    ///
    /// Guests are capped at `guest_ceiling`; tiers above 1080P need membership.
    #[must_use]
    pub fn is_entitled_to(&self, code: u32, guest_ceiling: QualityTier) -> bool {
        if !self.credentials_present {
            return code <= guest_ceiling.code();
        }
        let needs_membership = QualityTier::from_code(code)
            .map_or(code > QualityTier::GUEST_CEILING.code(), QualityTier::requires_membership);
        !needs_membership || self.vip
    }
}
