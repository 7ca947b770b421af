//! Configuration loading.
//!
//! Config file lookup order:
//! 1. Explicit path (the `--config` flag)
//! 2. `VOCAB_SRS_CONFIG` environment variable
//! 3. `<config dir>/vocab-srs/config.toml`, if it exists
//! 4. Built-in defaults
//!
//! `VOCAB_SRS_DB` overrides the database path from any file.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result};

pub const APP_DIR: &str = "vocab-srs";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_DB_NAME: &str = "vocab-srs.db";
pub const CONFIG_ENV: &str = "VOCAB_SRS_CONFIG";
pub const DB_ENV: &str = "VOCAB_SRS_DB";

pub const DEFAULT_MAX_UPDATE_ATTEMPTS: u32 = 3;
pub const DEFAULT_SESSION_SIZE: i64 = 20;

/// Runtime knobs for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Attempts per response before a contended update gives up.
    pub max_update_attempts: u32,
    /// Cap on never-seen items per session; `None` fills all free slots.
    pub max_new_items: Option<usize>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_update_attempts: DEFAULT_MAX_UPDATE_ATTEMPTS,
            max_new_items: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub database_path: Option<PathBuf>,
    pub scheduler: SchedulerSection,
    pub session: SessionSection,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerSection {
    pub max_update_attempts: u32,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            max_update_attempts: DEFAULT_MAX_UPDATE_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SessionSection {
    pub default_size: i64,
    pub max_new_items: Option<usize>,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            default_size: DEFAULT_SESSION_SIZE,
            max_new_items: None,
        }
    }
}

impl Config {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the config following the lookup order above.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = match config_file_path(explicit) {
            Some(path) => {
                debug!(path = %path.display(), "loading config file");
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("cannot read {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&content)?
            }
            None => Config::default(),
        };

        if let Ok(path) = std::env::var(DB_ENV) {
            config.database_path = Some(PathBuf::from(path));
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheduler.max_update_attempts < 1 {
            return Err(Error::Config(
                "scheduler.max_update_attempts must be at least 1".to_string(),
            ));
        }
        if self.session.default_size < 1 {
            return Err(Error::Config(
                "session.default_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            max_update_attempts: self.scheduler.max_update_attempts,
            max_new_items: self.session.max_new_items,
        }
    }

    /// Database location, creating the default directory when needed.
    pub fn database_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.database_path {
            return Ok(path.clone());
        }

        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR);
        std::fs::create_dir_all(&dir)?;
        Ok(dir.join(DEFAULT_DB_NAME))
    }
}

fn config_file_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }

    dirs::config_dir()
        .map(|d| d.join(APP_DIR).join(CONFIG_FILE_NAME))
        .filter(|p| p.exists())
}
