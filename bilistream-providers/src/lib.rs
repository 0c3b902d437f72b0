// bilistream provider clients
//
// Pure HTTP client implementations for the video platform backends. The
// clients know how to sign and issue requests and how to decode the wire
// format; retry, fallback and playback policy live in bilistream-core.

// Shared error types
pub mod error;

// HTTP clients
pub mod bilibili;

// Re-export client types for convenience
pub use bilibili::{BilibiliClient, BilibiliError, ClientOptions, SignedRequest, WbiKeys};
pub use error::ProviderClientError;
