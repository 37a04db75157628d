//! # Configuration Management
//!
//! Settings for the `shelfsync` command-line host:
//! - listening address and port for `serve`
//! - strict mode and exclusions for `pull`
//!
//! The file is TOML and lives in a platform-appropriate directory
//! (e.g., `~/.config/shelfsync/config.toml` on Linux) unless a path is given
//! explicitly. It is optional: without one, built-in defaults apply. The
//! sync core itself never reads configuration; the CLI resolves these values
//! and passes them in.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::protocol::DEFAULT_PORT;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_address: String,
    pub port: u16,
    pub strict: bool,
    pub exclude_paths: Vec<String>,
    pub exclude_patterns: Vec<String>,

    #[serde(skip)]
    pub config_file_path: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            strict: false,
            exclude_paths: Vec::new(),
            exclude_patterns: vec!["**/.DS_Store".to_string()],
            config_file_path: PathBuf::new(),
        }
    }
}

impl Config {
    /// Write a default configuration to `path` (or the default location).
    pub fn init(path: Option<&Path>) -> Result<Self> {
        let config_file = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if config_file.exists() {
            anyhow::bail!("Configuration already exists at {}", config_file.display());
        }

        let config = Self {
            config_file_path: config_file,
            ..Self::default()
        };
        config.save()?;

        Ok(config)
    }

    /// Load from an explicit path, which must exist, or from the default
    /// location when present. Falls back to defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_file = match path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Configuration file not found: {}", path.display());
                }
                path.to_path_buf()
            }
            None => {
                let default_path = Self::default_path()?;
                if !default_path.exists() {
                    return Ok(Self {
                        config_file_path: default_path,
                        ..Self::default()
                    });
                }
                default_path
            }
        };

        let content = std::fs::read_to_string(&config_file)?;
        let mut config: Config = toml::from_str(&content)?;
        config.config_file_path = config_file;

        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.config_file_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.config_file_path, content)?;
        Ok(())
    }

    pub fn config_path(&self) -> &Path {
        &self.config_file_path
    }

    /// `bind_address:port`, with `port_override` taking precedence.
    pub fn listen_addr(&self, port_override: Option<u16>) -> String {
        format!("{}:{}", self.bind_address, port_override.unwrap_or(self.port))
    }

    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
            .join("shelfsync");

        Ok(config_dir.join("config.toml"))
    }
}
