//! Platform-specific configuration paths

use crate::error::{CliError, CliResult};
use std::path::{Path, PathBuf};

/// Configuration paths for folio-migrate
#[derive(Debug, Clone)]
pub struct ConfigPaths {
    /// Base configuration directory
    pub config_dir: PathBuf,
    /// Path to config.json
    pub config_file: PathBuf,
}

impl ConfigPaths {
    /// Get configuration paths for the current platform
    ///
    /// Paths:
    /// - Linux: ~/.config/folio-migrate/
    /// - macOS: ~/Library/Application Support/folio-migrate/
    /// - Windows: %APPDATA%\folio-migrate\
    pub fn new() -> CliResult<Self> {
        Ok(Self::at(Self::get_config_dir()?))
    }

    /// Paths rooted at an explicit directory.
    pub fn at(config_dir: impl AsRef<Path>) -> Self {
        let config_dir = config_dir.as_ref().to_path_buf();
        Self {
            config_file: config_dir.join("config.json"),
            config_dir,
        }
    }

    /// Get the configuration directory, respecting FOLIO_CONFIG_DIR env var
    fn get_config_dir() -> CliResult<PathBuf> {
        if let Ok(dir) = std::env::var("FOLIO_CONFIG_DIR") {
            return Ok(PathBuf::from(dir));
        }

        let base_dir = dirs::config_dir().ok_or_else(|| {
            CliError::Config("Could not determine configuration directory".to_string())
        })?;

        Ok(base_dir.join("folio-migrate"))
    }

    /// Ensure the configuration directory exists
    pub fn ensure_dir_exists(&self) -> CliResult<()> {
        if !self.config_dir.exists() {
            std::fs::create_dir_all(&self.config_dir)?;
        }
        Ok(())
    }
}
