//! Bilibili Vendor Client
//!
//! Pure HTTP client for the Bilibili web API, independent of playback policy.
//!
//! # Features
//! - WBI request signing
//! - Nav / video metadata lookup
//! - Play URL (progressive and DASH) retrieval
//! - Danmaku, related videos, emote panel

pub mod client;
pub mod error;
pub mod types;
pub mod wbi;

pub use client::{BilibiliClient, ClientOptions};
pub use error::BilibiliError;
pub use types::*;
pub use wbi::{derive_keys, sign, SignedRequest, WbiKeys};
