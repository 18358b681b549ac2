// Configuration loader
// Loads settings from ~/.corvid/config.toml with environment overrides

use anyhow::{Context, Result};
use std::fs;

use super::settings::Config;

/// Load configuration from the corvid config file or defaults.
///
/// `CORVID_OLLAMA_HOST` (or `OLLAMA_HOST`) overrides the configured host,
/// so a pointed-elsewhere Ollama works without editing the file.
pub fn load_config() -> Result<Config> {
    let mut config = match try_load_from_corvid_config()? {
        Some(config) => config,
        None => Config::default(),
    };

    for var in ["CORVID_OLLAMA_HOST", "OLLAMA_HOST"] {
        if let Ok(host) = std::env::var(var) {
            if !host.is_empty() {
                config.ollama.host = normalize_host(&host);
                break;
            }
        }
    }

    Ok(config)
}

fn try_load_from_corvid_config() -> Result<Option<Config>> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    let config_path = home.join(".corvid/config.toml");

    if !config_path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&config_path)
        .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

    tracing::info!("Loaded configuration from {}", config_path.display());
    Ok(Some(config))
}

/// Ollama-style host values may omit the scheme ("localhost:11434")
fn normalize_host(host: &str) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        host.trim_end_matches('/').to_string()
    } else {
        format!("http://{}", host.trim_end_matches('/'))
    }
}
