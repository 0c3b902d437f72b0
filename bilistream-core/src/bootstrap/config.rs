//! Configuration loading

use anyhow::{Context, Result};
use tracing::info;

use crate::Config;

/// Load configuration from config file or environment variables
///
/// Config file search order:
/// 1. The explicit `path` argument (CLI `--config`)
/// 2. BILISTREAM_CONFIG_PATH environment variable
/// 3. ./config.yaml (current working directory), if present
/// 4. Fall back to environment variables only
///
/// A file named by 1 or 2 must exist; whichever file is chosen must parse.
pub fn load_config(path: Option<&str>) -> Result<Config> {
    let config_path = path
        .map(str::to_string)
        .or_else(|| std::env::var("BILISTREAM_CONFIG_PATH").ok().filter(|p| !p.is_empty()))
        .or_else(|| {
            let cwd = "config.yaml";
            std::path::Path::new(cwd).exists().then(|| cwd.to_string())
        });

    let config = match config_path {
        Some(path) => {
            eprintln!("Loading config from {path}");
            Config::from_file(&path).with_context(|| format!("Failed to load config from {path}"))?
        }
        None => Config::from_env().context("Failed to load config from environment")?,
    };

    // Fail fast on misconfigurations
    if let Err(errors) = config.validate() {
        for error in &errors {
            tracing::error!("Config validation error: {}", error);
        }
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }

    info!(api_base = %config.http.api_base, "Configuration loaded and validated");
    Ok(config)
}
