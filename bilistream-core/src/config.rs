use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use bilistream_providers::bilibili::ClientOptions;

use crate::models::{QualityChain, QualityTier, VideoCodec};
use crate::playback::{NegotiationPolicy, SessionOptions, StreamResolver};
use crate::{Error, Result};

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub logging: LoggingConfig,
    pub http: HttpConfig,
    pub playback: PlaybackConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String, // "json" or "pretty"
    pub file_path: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
            file_path: None,
        }
    }
}

/// Bilibili endpoint and transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub api_base: String,
    pub user_agent: String,
    pub referer: String,
    pub connect_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    /// Login cookie; anonymous when unset
    pub sessdata: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        let options = ClientOptions::default();
        Self {
            api_base: options.api_base,
            user_agent: options.user_agent,
            referer: options.referer,
            connect_timeout_seconds: options.connect_timeout.as_secs(),
            request_timeout_seconds: options.timeout.as_secs(),
            sessdata: None,
        }
    }
}

/// Negotiation and session tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Fallback chain, strictly descending tier codes
    pub quality_chain: Vec<u32>,
    pub retry_delay_ms: u64,
    pub tier_delay_ms: u64,
    pub switch_retry_delay_ms: u64,
    /// Highest tier requested for anonymous callers
    pub guest_ceiling: u32,
    /// Starting tier for callers with credentials
    pub logged_in_quality: u32,
    pub notice_capacity: usize,
    /// Codec order for picking among same-tier representations
    pub codec_preference: Vec<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            quality_chain: QualityChain::default().tiers().iter().map(|t| t.code()).collect(),
            retry_delay_ms: 1500,
            tier_delay_ms: 1500,
            switch_retry_delay_ms: 2000,
            guest_ceiling: QualityTier::GUEST_CEILING.code(),
            logged_in_quality: QualityTier::K4.code(),
            notice_capacity: 16,
            codec_preference: vec![
                "avc".to_string(),
                "hevc".to_string(),
                "av1".to_string(),
                "dolby_vision".to_string(),
            ],
        }
    }
}

impl Config {
    /// Load configuration from multiple sources with priority:
    /// 1. Environment variables (highest priority)
    /// 2. Config file (if provided; must exist and parse)
    /// 3. Defaults (lowest priority)
    pub fn load(config_file: Option<&str>) -> std::result::Result<Self, ConfigError> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_file {
            if !Path::new(path).is_file() {
                return Err(ConfigError::Message(format!("configuration file {path} not found")));
            }
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // BILISTREAM_LOGGING__LEVEL, BILISTREAM_PLAYBACK__RETRY_DELAY_MS, ...
        builder = builder.add_source(
            Environment::with_prefix("BILISTREAM")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Load from environment variables only
    pub fn from_env() -> std::result::Result<Self, ConfigError> {
        Self::load(None)
    }

    /// Load from file path
    pub fn from_file(path: &str) -> std::result::Result<Self, ConfigError> {
        Self::load(Some(path))
    }

    /// Check every setting, collecting all problems
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            errors.push(format!("logging.format must be json or pretty, got {}", self.logging.format));
        }
        if self.http.api_base.is_empty() {
            errors.push("http.api_base must not be empty".to_string());
        }
        if self.http.request_timeout_seconds == 0 {
            errors.push("http.request_timeout_seconds must be positive".to_string());
        }
        if let Err(e) = QualityChain::from_codes(&self.playback.quality_chain) {
            errors.push(format!("playback.quality_chain: {e}"));
        }
        if QualityTier::from_code(self.playback.guest_ceiling).is_none() {
            errors.push(format!("playback.guest_ceiling: unknown tier {}", self.playback.guest_ceiling));
        }
        if QualityTier::from_code(self.playback.logged_in_quality).is_none() {
            errors.push(format!(
                "playback.logged_in_quality: unknown tier {}",
                self.playback.logged_in_quality
            ));
        }
        if self.playback.notice_capacity == 0 {
            errors.push("playback.notice_capacity must be positive".to_string());
        }
        for codec in &self.playback.codec_preference {
            if let Err(e) = codec.parse::<VideoCodec>() {
                errors.push(format!("playback.codec_preference: {e}"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// HTTP client settings
    #[must_use]
    pub fn client_options(&self) -> ClientOptions {
        ClientOptions {
            api_base: self.http.api_base.clone(),
            user_agent: self.http.user_agent.clone(),
            referer: self.http.referer.clone(),
            connect_timeout: Duration::from_secs(self.http.connect_timeout_seconds),
            timeout: Duration::from_secs(self.http.request_timeout_seconds),
        }
    }

    pub fn negotiation_policy(&self) -> Result<NegotiationPolicy> {
        let chain = QualityChain::from_codes(&self.playback.quality_chain)
            .map_err(|e| Error::InvalidConfig(format!("playback.quality_chain: {e}")))?;
        let guest_ceiling = tier(self.playback.guest_ceiling, "playback.guest_ceiling")?;
        Ok(NegotiationPolicy {
            chain,
            retry_delay: Duration::from_millis(self.playback.retry_delay_ms),
            tier_delay: Duration::from_millis(self.playback.tier_delay_ms),
            switch_retry_delay: Duration::from_millis(self.playback.switch_retry_delay_ms),
            guest_ceiling,
        })
    }

    pub fn session_options(&self) -> Result<SessionOptions> {
        Ok(SessionOptions {
            logged_in_quality: tier(self.playback.logged_in_quality, "playback.logged_in_quality")?,
            notice_capacity: self.playback.notice_capacity,
        })
    }

    pub fn stream_resolver(&self) -> Result<StreamResolver> {
        let preference = self
            .playback
            .codec_preference
            .iter()
            .map(|c| c.parse::<VideoCodec>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::InvalidConfig(format!("playback.codec_preference: {e}")))?;
        Ok(StreamResolver::new(preference))
    }
}

fn tier(code: u32, field: &str) -> Result<QualityTier> {
    QualityTier::from_code(code)
        .ok_or_else(|| Error::InvalidConfig(format!("{field}: unknown tier {code}")))
}
