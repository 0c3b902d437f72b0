pub mod bootstrap;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod playback;
pub mod provider;

pub use config::Config;
pub use error::{Error, Result};
pub use playback::{PlaybackSession, SessionState};
pub use provider::{BilibiliBackend, SessionContext};
