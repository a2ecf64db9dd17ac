//! Configuration management

use crate::error::{DlpError, Result};
use crate::types::Config;
use crate::utils::paths::{ensure_dir, get_config_dir, get_config_path};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Load configuration from the default location, merging with defaults
pub async fn load_config() -> Result<Config> {
    load_config_from(Path::new(&get_config_path())).await
}

/// Load configuration from `path`; a missing file yields the defaults
pub async fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(with_runtime_defaults(Config::default()));
    }

    let content = fs::read_to_string(path).await?;
    let user_config: Config = serde_json::from_str(&content)
        .map_err(|e| DlpError::InvalidConfig(format!("{}: {}", path.display(), e)))?;

    Ok(with_runtime_defaults(user_config))
}

/// Fill in values that can only be known at runtime
fn with_runtime_defaults(mut config: Config) -> Config {
    if config.download_dir.is_empty() {
        config.download_dir = dirs::download_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| ".".into());
    }
    config
}

/// Save configuration to the default location
pub async fn save_config(config: &Config) -> Result<()> {
    ensure_dir(&PathBuf::from(get_config_dir())).await?;
    save_config_to(config, Path::new(&get_config_path())).await
}

pub async fn save_config_to(config: &Config, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config)?;
    fs::write(path, content).await?;
    Ok(())
}
