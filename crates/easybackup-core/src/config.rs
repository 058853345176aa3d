//! Backup configuration
//!
//! Loaded in layers: the embedded `config/easybackup.toml`, then an override
//! file, then environment variables. The engine itself never reads the
//! environment; it receives a finished [`EngineConfig`].

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::path::normalize;

/// Embedded default configuration
const DEFAULT_CONFIG: &str = include_str!("../../../config/easybackup.toml");

fn line_break_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\r\n|\r|\n").expect("valid regex"))
}

/// Operator-facing backup settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfiguration {
    /// mysqldump invocation with `{user}`-style placeholders
    pub dump_command_template: String,
    /// mysql invocation; `{sql_file}` is the dump to load
    pub restore_command_template: String,
    pub backup_directory: String,
    /// Newline-delimited paths relative to the application root
    pub paths_to_backup: String,
    /// Keep only this many archives; `<= 0` keeps all
    pub max_retained_backups: i64,
    pub database_url: Option<String>,
    pub git_command: String,
    pub command_timeout_secs: Option<u64>,
}

impl Default for BackupConfiguration {
    fn default() -> Self {
        Self {
            dump_command_template: String::new(),
            restore_command_template: String::new(),
            backup_directory: "var/easy_backup/".to_string(),
            paths_to_backup: String::new(),
            max_retained_backups: 0,
            database_url: None,
            git_command: "git rev-parse HEAD".to_string(),
            command_timeout_secs: None,
        }
    }
}

impl BackupConfiguration {
    /// Embedded defaults only
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(DEFAULT_CONFIG)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))
    }

    /// Load configuration (explicit file, then default location, then
    /// embedded defaults) and apply environment overrides.
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        let config = match override_path {
            Some(path) => {
                if !path.exists() {
                    return Err(Error::Config(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
                Self::read_file(path)?
            }
            None => match default_config_path() {
                Some(path) if path.exists() => Self::read_file(&path)?,
                _ => Self::embedded()?,
            },
        };

        config.with_env_overrides(|key| std::env::var(key).ok())
    }

    fn read_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config: {}", e)))?;

        // Keys missing from the override file fall back to the embedded ones
        let mut merged: toml::Table = toml::from_str(DEFAULT_CONFIG)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;
        let overrides: toml::Table = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;
        merged.extend(overrides);

        toml::Value::Table(merged)
            .try_into()
            .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))
    }

    /// Apply `EASYBACKUP_*` and `DATABASE_URL` values from `lookup`
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("EASYBACKUP_DUMP_COMMAND") {
            self.dump_command_template = v;
        }
        if let Some(v) = lookup("EASYBACKUP_RESTORE_COMMAND") {
            self.restore_command_template = v;
        }
        if let Some(v) = lookup("EASYBACKUP_BACKUP_DIR") {
            self.backup_directory = v;
        }
        if let Some(v) = lookup("EASYBACKUP_PATHS") {
            self.paths_to_backup = v;
        }
        if let Some(v) = lookup("EASYBACKUP_MAX_BACKUPS") {
            self.max_retained_backups = v.trim().parse().map_err(|_| {
                Error::Config(format!("EASYBACKUP_MAX_BACKUPS is not a number: {}", v))
            })?;
        }
        if let Some(v) = lookup("EASYBACKUP_COMMAND_TIMEOUT") {
            let secs: u64 = v.trim().parse().map_err(|_| {
                Error::Config(format!("EASYBACKUP_COMMAND_TIMEOUT is not a number: {}", v))
            })?;
            self.command_timeout_secs = Some(secs);
        }
        if let Some(v) = lookup("DATABASE_URL") {
            self.database_url = Some(v);
        }
        Ok(self)
    }

    /// Configured backup paths: trimmed, blank lines dropped
    pub fn paths(&self) -> Vec<String> {
        line_break_re()
            .split(&self.paths_to_backup)
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(String::from)
            .collect()
    }

    /// Number of archives to keep, if retention is enabled
    pub fn retention_limit(&self) -> Option<usize> {
        (self.max_retained_backups > 0).then_some(self.max_retained_backups as usize)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs
            .filter(|s| *s > 0)
            .map(Duration::from_secs)
    }

    pub fn database_url(&self) -> Option<&str> {
        self.database_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
    }
}

/// Default override location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("easybackup").join("config.toml"))
}

/// Host application identity recorded in manifests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppInfo {
    pub version: String,
    pub description: String,
}

impl AppInfo {
    pub fn new(version: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            description: description.into(),
        }
    }
}

impl Default for AppInfo {
    fn default() -> Self {
        let version = env!("CARGO_PKG_VERSION");
        Self::new(version, format!("EasyBackup {}", version))
    }
}

/// Everything a [`crate::BackupEngine`] needs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Application root; backup paths and restores are relative to it
    pub app_root: PathBuf,
    pub app: AppInfo,
    pub backup: BackupConfiguration,
}

impl EngineConfig {
    pub fn new(app_root: impl Into<PathBuf>, backup: BackupConfiguration) -> Self {
        Self {
            app_root: app_root.into(),
            app: AppInfo::default(),
            backup,
        }
    }

    pub fn with_app(mut self, app: AppInfo) -> Self {
        self.app = app;
        self
    }

    /// Absolute (or root-relative) backup directory
    pub fn backup_dir(&self) -> PathBuf {
        let dir = normalize(&self.backup.backup_directory);
        if dir.is_absolute() {
            dir
        } else {
            self.app_root.join(dir)
        }
    }
}
