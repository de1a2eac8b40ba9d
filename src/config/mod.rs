mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    parse_config(&content).with_context(|| format!("Invalid config file: {:?}", path))
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    // Try default locations
    let default_paths = [
        "./stemforge.toml",
        "./config.toml",
        "~/.config/stemforge/config.toml",
        "/etc/stemforge/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            tracing::debug!("Using config file {:?}", path);
            return load_config(path);
        }
    }

    // Return default config if no file found
    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.pipeline.concurrency == 0 {
        anyhow::bail!("pipeline.concurrency cannot be 0");
    }

    if config.separation.models.is_empty() {
        anyhow::bail!("separation.models must list at least one model");
    }

    if config.separation.models.iter().any(|m| m.trim().is_empty()) {
        anyhow::bail!("separation.models contains an empty model name");
    }

    if config.resilience.max_attempts == 0 {
        anyhow::bail!("resilience.max_attempts cannot be 0");
    }

    if config.resilience.base_delay_ms == 0 {
        anyhow::bail!("resilience.base_delay_ms cannot be 0");
    }

    if config.resilience.base_delay_ms > config.resilience.max_delay_ms {
        anyhow::bail!("resilience.base_delay_ms cannot exceed resilience.max_delay_ms");
    }

    if config.validation.min_stem_bytes > config.validation.max_stem_bytes {
        anyhow::bail!("validation.min_stem_bytes cannot exceed validation.max_stem_bytes");
    }

    let mut names = HashSet::new();
    for channel in &config.channels {
        if channel.name.trim().is_empty() {
            anyhow::bail!("Channel names cannot be empty");
        }
        if !names.insert(channel.name.as_str()) {
            anyhow::bail!("Channel '{}' is defined more than once", channel.name);
        }
        if channel.stems.is_empty() && channel.optional_stems.is_empty() {
            anyhow::bail!("Channel '{}' has no stems", channel.name);
        }
        if let Some(ref watermark) = channel.watermark {
            if !watermark.exists() {
                tracing::warn!(
                    "Watermark for channel '{}' does not exist: {:?}",
                    channel.name,
                    watermark
                );
            }
        }
    }

    Ok(())
}
