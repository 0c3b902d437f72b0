use bilistream_providers::ProviderClientError;
use thiserror::Error;

use crate::playback::PlaybackError;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderClientError),

    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type Result<T> = std::result::Result<T, Error>;
