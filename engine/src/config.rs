//! Settings file and per-request overrides.
//!
//! Settings are stored in TOML:
//!
//! ```toml
//! [file]
//! source-dir = "/photos/inbox"
//! target-dir = "/photos/library"
//! working-mode = "MOVE"
//! trash-folder-name = "trash"
//! delete-file-list = ["Thumbs.db", ".DS_Store"]
//!
//! [job]
//! channel-timeout-secs = 3600
//! ```
//!
//! A run never reads settings directly. `Settings::resolve` folds in the
//! caller's overrides once and produces the immutable `JobConfig`.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::EngineError;
use crate::model::{JobConfig, Mode, DEFAULT_TRASH_FOLDER};

/// Name of the settings file looked up in the working directory.
pub const LOCAL_SETTINGS_FILE: &str = "datesort.toml";

/// Default lifetime of a job's progress channel.
pub const DEFAULT_CHANNEL_TIMEOUT_SECS: u64 = 3600;

/// Errors that can occur while loading settings.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Explicitly named settings file does not exist
    #[error("settings file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Settings file could not be read
    #[error("failed to read settings file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid TOML syntax or structure
    #[error("invalid settings: {0}")]
    Invalid(#[from] toml::de::Error),
}

/// Root of the settings file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub file: FileSettings,

    #[serde(default)]
    pub job: JobSettings,
}

/// What to classify and how.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FileSettings {
    /// Default source tree
    #[serde(default)]
    pub source_dir: String,

    /// Default target tree
    #[serde(default)]
    pub target_dir: String,

    /// `MOVE` moves; any other value copies
    #[serde(default)]
    pub working_mode: String,

    #[serde(default = "default_trash_folder_name")]
    pub trash_folder_name: String,

    /// Exact filenames deleted instead of classified
    #[serde(default)]
    pub delete_file_list: Vec<String>,
}

fn default_trash_folder_name() -> String {
    DEFAULT_TRASH_FOLDER.to_string()
}

impl Default for FileSettings {
    fn default() -> Self {
        FileSettings {
            source_dir: String::new(),
            target_dir: String::new(),
            working_mode: String::new(),
            trash_folder_name: default_trash_folder_name(),
            delete_file_list: Vec::new(),
        }
    }
}

/// Job runner tuning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JobSettings {
    #[serde(default = "default_channel_timeout_secs")]
    pub channel_timeout_secs: u64,
}

fn default_channel_timeout_secs() -> u64 {
    DEFAULT_CHANNEL_TIMEOUT_SECS
}

impl Default for JobSettings {
    fn default() -> Self {
        JobSettings {
            channel_timeout_secs: DEFAULT_CHANNEL_TIMEOUT_SECS,
        }
    }
}

/// Directories supplied with a single start request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirOverrides {
    pub source_dir: Option<String>,
    pub target_dir: Option<String>,
}

impl DirOverrides {
    pub fn new(source_dir: Option<String>, target_dir: Option<String>) -> Self {
        DirOverrides {
            source_dir,
            target_dir,
        }
    }
}

/// Pick the override when it is present and not blank, the default otherwise.
fn pick<'a>(name: &str, requested: Option<&'a str>, configured: &'a str) -> &'a str {
    match requested {
        Some(value) if !value.trim().is_empty() => {
            tracing::info!(setting = name, value, "using directory from request");
            value
        }
        _ => {
            tracing::info!(setting = name, value = configured, "using configured directory");
            configured
        }
    }
}

impl Settings {
    /// Load settings, with fallback to defaults.
    ///
    /// Attempts to load settings in the following order:
    /// 1. If `path` is provided, load from that file
    /// 2. `datesort.toml` in the current directory
    /// 3. `~/.config/datesort/config.toml`
    /// 4. Built-in defaults (no directories configured)
    ///
    /// # Errors
    ///
    /// Returns an error if a settings file exists (or was named) but cannot be
    /// read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::load_from_file(path);
        }

        let local = PathBuf::from(LOCAL_SETTINGS_FILE);
        if local.exists() {
            return Self::load_from_file(&local);
        }

        if let Ok(home) = std::env::var("HOME") {
            let home_settings = PathBuf::from(home)
                .join(".config")
                .join("datesort")
                .join("config.toml");
            if home_settings.exists() {
                return Self::load_from_file(&home_settings);
            }
        }

        Ok(Self::default())
    }

    /// Load settings from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let settings = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn mode(&self) -> Mode {
        Mode::from_working_mode(&self.file.working_mode)
    }

    pub fn channel_timeout(&self) -> Duration {
        Duration::from_secs(self.job.channel_timeout_secs)
    }

    /// Fold `overrides` into these settings and build the run's configuration.
    ///
    /// # Errors
    /// `EngineError::InvalidConfig` if an effective directory is blank or the
    /// trash folder name is unusable.
    pub fn resolve(&self, overrides: &DirOverrides) -> Result<JobConfig, EngineError> {
        let source = pick("source-dir", overrides.source_dir.as_deref(), &self.file.source_dir);
        let target = pick("target-dir", overrides.target_dir.as_deref(), &self.file.target_dir);

        if source.trim().is_empty() {
            return Err(EngineError::InvalidConfig {
                reason: "no source directory configured or requested".to_string(),
            });
        }
        if target.trim().is_empty() {
            return Err(EngineError::InvalidConfig {
                reason: "no target directory configured or requested".to_string(),
            });
        }

        JobConfig::new(
            source,
            target,
            self.mode(),
            self.file.trash_folder_name.clone(),
            self.file.delete_file_list.iter().cloned(),
        )
    }
}
