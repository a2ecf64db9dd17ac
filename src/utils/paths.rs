//! Path utilities for dlp-conductor
//!
//! Respects XDG Base Directory Specification

use crate::error::Result;
use std::env;
use std::path::{MAIN_SEPARATOR, Path, PathBuf};
use tokio::fs;

const APP_NAME: &str = "dlp-conductor";

/// Get config directory path
/// Respects XDG_CONFIG_HOME, defaults to ~/.config/dlp-conductor
pub fn get_config_dir() -> String {
    let base = env::var("XDG_CONFIG_HOME").unwrap_or_else(|_| {
        dirs::config_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{}/.config", env::var("HOME").unwrap_or_default()))
    });

    format!("{}/{}", base, APP_NAME)
}

/// Get data directory path
/// Respects XDG_DATA_HOME, defaults to ~/.local/share/dlp-conductor
pub fn get_data_dir() -> String {
    let base = env::var("XDG_DATA_HOME").unwrap_or_else(|_| {
        dirs::data_dir()
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| format!("{}/.local/share", env::var("HOME").unwrap_or_default()))
    });

    format!("{}/{}", base, APP_NAME)
}

/// Get config file path
pub fn get_config_path() -> String {
    format!("{}/config.json", get_config_dir())
}

/// Managed tools directory, where provisioned binaries live
pub fn get_tools_dir(config_override: Option<&str>) -> PathBuf {
    match config_override {
        Some(dir) if !dir.trim().is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(get_data_dir()).join("tools"),
    }
}

/// Ensure a directory exists
pub async fn ensure_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).await?;
    Ok(())
}

/// Platform executable file name for a stem ("ffmpeg" -> "ffmpeg.exe" on Windows)
pub fn exe_name(stem: &str) -> String {
    format!("{}{}", stem, env::consts::EXE_SUFFIX)
}

/// Rewrite platform separators to forward slashes
pub fn normalize_separators(path: &str) -> String {
    path.replace(MAIN_SEPARATOR, "/")
}
