pub mod error;
pub mod settings;

pub use error::*;
pub use settings::{PollSettings, ProvisioConfig, RetrySettings, VendorSettings};

use std::path::PathBuf;

pub const ENV_CONFIG_PATH: &str = "PROVISIO_CONFIG_PATH";

const CANDIDATES: [&str; 4] = [
    "provisio.local.yaml",
    ".provisio.local.yaml",
    "provisio.yaml",
    ".provisio.yaml",
];

/// Location of the user-wide config file (`~/.config/provisio/provisio.yaml`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or(ConfigError::ConfigDirNotFound)?;
    Ok(config_dir.join("provisio").join("provisio.yaml"))
}

/// Find the config file to load
///
/// Search order:
/// 1. `PROVISIO_CONFIG_PATH`
/// 2. current directory: provisio.local.yaml, .provisio.local.yaml, provisio.yaml, .provisio.yaml
/// 3. the same names under ./.provisio/
/// 4. ~/.config/provisio/provisio.yaml
pub fn find_config_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(ENV_CONFIG_PATH) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!(path = %path.display(), "{ENV_CONFIG_PATH} points at a missing file");
    }

    let current_dir = std::env::current_dir()?;

    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    let project_dir = current_dir.join(".provisio");
    if project_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = project_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(global_config) = global_config_path().ok().filter(|p| p.exists()) {
        return Ok(global_config);
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// Discover, parse and apply environment overrides
pub fn load() -> Result<ProvisioConfig> {
    let path = find_config_file()?;
    tracing::debug!(path = %path.display(), "loading config");
    let mut config = ProvisioConfig::from_file(&path)?;
    config.apply_env_overrides();
    Ok(config)
}

/// Like [`load`], but falls back to defaults plus environment when no
/// config file exists anywhere
pub fn load_or_default() -> Result<ProvisioConfig> {
    match load() {
        Err(ConfigError::ConfigFileNotFound) => {
            let mut config = ProvisioConfig::default();
            config.apply_env_overrides();
            Ok(config)
        }
        other => other,
    }
}
