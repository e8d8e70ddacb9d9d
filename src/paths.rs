//! Path resolution for gatesync
//!
//! # Environment Variables
//!
//! - `GATESYNC_CONFIG_DIR` - Override config directory
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `GATESYNC_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/gatesync` (if set)
//! 3. Platform default:
//!    - Windows: `%APPDATA%\gatesync`
//!    - macOS/Linux: `~/.config/gatesync`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "GATESYNC_CONFIG_DIR";

const APP_DIR: &str = "gatesync";

/// Get the gatesync config directory path
pub fn config_dir() -> Result<PathBuf> {
    let platform = if cfg!(windows) {
        dirs::config_dir()
    } else {
        dirs::home_dir().map(|home| home.join(".config"))
    };
    resolve_config_dir(
        std::env::var(ENV_CONFIG_DIR).ok(),
        std::env::var("XDG_CONFIG_HOME").ok(),
        platform,
    )
}

fn resolve_config_dir(
    override_dir: Option<String>,
    xdg_config: Option<String>,
    platform_config: Option<PathBuf>,
) -> Result<PathBuf> {
    if let Some(dir) = override_dir {
        let path = expand(&dir);
        log::debug!("Using config dir from {ENV_CONFIG_DIR}: {}", path.display());
        return Ok(path);
    }

    if let Some(xdg) = xdg_config.filter(|x| !x.is_empty()) {
        let path = PathBuf::from(xdg).join(APP_DIR);
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let path = platform_config
        .context("Could not determine home directory")?
        .join(APP_DIR);
    log::debug!("Using default config dir: {}", path.display());
    Ok(path)
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}
