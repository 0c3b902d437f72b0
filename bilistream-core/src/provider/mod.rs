// Playback Provider System
//
// Two-tier architecture:
//
// Tier 1: bilistream-providers (Pure HTTP client)
//   - bilibili::BilibiliClient, WBI signing, wire types
//   - No dependency on playback policy
//
// Tier 2: bilistream-core/provider (Backend adapters)
//   - BilibiliBackend calls BilibiliClient to implement PlaybackBackend
//   - SessionContext carries entitlement and signing keys per session

pub mod bilibili;
pub mod context;
pub mod traits;

pub use bilibili::BilibiliBackend;
pub use context::SessionContext;
pub use traits::{ManifestSource, PlaybackBackend};
