//! Configuration resolution for evlog.
//!
//! Implements deterministic config resolution order:
//! 1. Explicit path (CLI `--config`)
//! 2. `EVLOG_CONFIG` environment variable
//! 3. `$XDG_CONFIG_HOME/evlog/config.toml`, else `~/.config/evlog/config.toml`
//! 4. Built-in defaults
//!
//! Environment overrides (`EVLOG_*`) are applied on top of whichever source
//! won, and the result is validated.

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use super::Config;
use crate::error::{Error, Result};

const CONFIG_FILE_NAME: &str = "config.toml";

/// Where the effective configuration came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigSource {
    Explicit,
    EnvVar,
    XdgConfig,
    Default,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Explicit => write!(f, "explicit"),
            ConfigSource::EnvVar => write!(f, "env"),
            ConfigSource::XdgConfig => write!(f, "xdg"),
            ConfigSource::Default => write!(f, "default"),
        }
    }
}

/// Configuration resolver with deterministic resolution order.
#[derive(Debug, Default)]
pub struct ConfigResolver {
    explicit_path: Option<PathBuf>,
}

impl ConfigResolver {
    /// Create a resolver with an optional explicit config path.
    pub fn new(explicit_path: Option<PathBuf>) -> Self {
        ConfigResolver { explicit_path }
    }

    /// Create a resolver with no CLI overrides.
    pub fn with_defaults() -> Self {
        ConfigResolver::default()
    }

    /// Resolve the config directory path.
    pub fn resolve_config_dir(&self) -> Option<PathBuf> {
        if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
            if !xdg.is_empty() {
                return Some(PathBuf::from(xdg).join("evlog"));
            }
        }
        dirs::config_dir().map(|d| d.join("evlog"))
    }

    /// Resolve the config file path.
    pub fn resolve_path(&self) -> (Option<PathBuf>, ConfigSource) {
        // 1. CLI flag
        if let Some(ref path) = self.explicit_path {
            return (Some(path.clone()), ConfigSource::Explicit);
        }

        // 2. EVLOG_CONFIG env var
        if let Ok(path) = env::var("EVLOG_CONFIG") {
            if !path.is_empty() {
                return (Some(PathBuf::from(path)), ConfigSource::EnvVar);
            }
        }

        // 3. XDG config dir, only if the file exists
        if let Some(dir) = self.resolve_config_dir() {
            let path = dir.join(CONFIG_FILE_NAME);
            if path.exists() {
                return (Some(path), ConfigSource::XdgConfig);
            }
        }

        // 4. Default
        (None, ConfigSource::Default)
    }

    /// Load, override from env, and validate.
    pub fn load(&self) -> Result<(Config, ConfigSource)> {
        let (path, source) = self.resolve_path();
        let config = match path {
            Some(p) => load_file(&p)?,
            None => Config::default(),
        };
        let config = config.with_env_overrides()?;
        config.validate()?;
        Ok((config, source))
    }
}

/// Read a config file, picking the format from its extension (TOML if none).
pub fn load_file(path: &Path) -> Result<Config> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::Config(format!(
            "failed to read config from {}: {}",
            path.display(),
            e
        ))
    })?;
    let format = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or("toml");
    Config::from_str_with_format(&content, format).map_err(|e| match e {
        Error::UnsupportedFormat(_) => e,
        other => Error::Config(format!("failed to parse {}: {}", path.display(), other)),
    })
}
