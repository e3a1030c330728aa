//! Centralized path resolution for choro
//!
//! # Environment Variables
//!
//! - `CHORO_CONFIG_DIR` - Override config directory (e.g., `~/dotfiles/choro`)
//! - `CHORO_PREFIX` - Override the working prefix
//!
//! # Path Resolution Priority
//!
//! For config_dir():
//! 1. `CHORO_CONFIG_DIR` environment variable
//! 2. `XDG_CONFIG_HOME/choro` (if set)
//! 3. `~/.config/choro`
//!
//! The working prefix comes from `CHORO_PREFIX`, then the `prefix` key in
//! `config.toml`, then `~/.choro`.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "CHORO_CONFIG_DIR";

/// Environment variable for working prefix override
pub const ENV_PREFIX: &str = "CHORO_PREFIX";

/// Directory of per-project deps, relative to the current directory
pub const CWD_DEPS_DIR: &str = "choro-deps";

/// Get the choro config directory path
pub fn config_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_CONFIG_DIR) {
        let path = expand(&dir);
        log::debug!(
            "Using config dir from {}: {}",
            ENV_CONFIG_DIR,
            path.display()
        );
        return Ok(path);
    }

    if let Ok(xdg_config) = std::env::var("XDG_CONFIG_HOME") {
        let path = PathBuf::from(xdg_config).join("choro");
        log::debug!("Using XDG_CONFIG_HOME: {}", path.display());
        return Ok(path);
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".config").join("choro"))
}

/// Path of `config.toml`
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Deps of the `local` source
pub fn local_deps_dir() -> Result<PathBuf> {
    Ok(config_dir()?.join("deps"))
}

/// Deps of the `cwd` source, when the current directory has them
pub fn cwd_deps_dir() -> Option<PathBuf> {
    let dir = std::env::current_dir().ok()?.join(CWD_DEPS_DIR);
    dir.is_dir().then_some(dir)
}

/// Resolve the working prefix from the environment or the configured value.
pub fn prefix_dir(configured: Option<&str>) -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(ENV_PREFIX) {
        return Ok(expand(&dir));
    }
    if let Some(dir) = configured {
        return Ok(expand(dir));
    }
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".choro"))
}

/// The working prefix and its fixed subdirectories.
#[derive(Debug, Clone)]
pub struct WorkPrefix {
    root: PathBuf,
}

impl WorkPrefix {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn logs(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Create the prefix layout if it is missing.
    pub fn ensure(&self) -> Result<()> {
        for dir in ["sources", "build", "downloads", "logs", "vars"] {
            let path = self.root.join(dir);
            fs::create_dir_all(&path)
                .with_context(|| format!("Could not create {}", path.display()))?;
        }
        Ok(())
    }
}

/// Expand ~ and environment variables in a path string.
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
