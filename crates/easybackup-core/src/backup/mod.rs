//! Backup engine
//!
//! A backup is a ZIP archive named `YYYY-MM-DD_HHMMSS.zip` in the backup
//! directory. It holds `manifest.json`, the configured application paths
//! (relative to the application root) and, for MySQL, `database_dump.sql`.
//!
//! # Runs
//!
//! - [`BackupEngine::create_backup`] stages everything in a directory named
//!   after the identifier, zips it, removes the staging directory and
//!   applies retention.
//! - [`BackupEngine::restore_backup`] unzips into the same staging name,
//!   loads the dump, moves files back under the application root and removes
//!   the staging directory.
//!
//! Create, restore, delete and prepare-recovery are serialized per backup
//! directory. Each create/restore run rewrites `easybackup.log`.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::LOG_FILE_NAME;
use crate::command::{CommandExecutor, SystemCommandRunner};
use crate::config::EngineConfig;
use crate::database::{ConnectionInfo, DatabaseBackend};
use crate::error::{Error, Result};
use crate::fs::{Filesystem, LocalFilesystem};
use crate::path::BackupName;

mod create;
mod restore;
mod retention;
mod status;

pub use retention::select_for_removal;
pub use status::StatusCheck;

/// Ignore file dropped into the backup directory
pub const GITIGNORE_FILENAME: &str = ".gitignore";

pub(crate) const CREATE_START: &str = "--- S T A R T   C R E A T I N G   B A C K U P ---";
pub(crate) const CREATE_FINISH: &str = "--- F I N I S H E D   C R E A T I N G   B A C K U P ---";
pub(crate) const RESTORE_START: &str = "--- S T A R T   R E S T O R E ---";
pub(crate) const RESTORE_FINISH: &str = "--- F I N I S H E D   R E S T O R E ---";

/// Information about a stored backup archive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackupInfo {
    /// Archive file name (`YYYY-MM-DD_HHMMSS.zip`)
    pub name: String,
    /// Size in bytes
    pub size_bytes: u64,
    /// Size in MiB, rounded to three decimals
    pub size_mb: f64,
    /// File modification time
    pub modified_at: DateTime<Utc>,
}

impl BackupInfo {
    pub fn identifier(&self) -> &str {
        self.name.strip_suffix(".zip").unwrap_or(&self.name)
    }
}

/// Progress of a create run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateStage {
    Init,
    ManifestWritten,
    PathsCopied,
    DatabaseDumped,
    Archived,
    Cleaned,
    RetentionApplied,
    Done,
}

impl fmt::Display for CreateStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CreateStage::Init => "init",
            CreateStage::ManifestWritten => "manifest written",
            CreateStage::PathsCopied => "paths copied",
            CreateStage::DatabaseDumped => "database dumped",
            CreateStage::Archived => "archived",
            CreateStage::Cleaned => "cleaned",
            CreateStage::RetentionApplied => "retention applied",
            CreateStage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Progress of a restore run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestoreStage {
    Init,
    Unzipped,
    DatabaseRestored,
    FilesRestored,
    Cleaned,
    Done,
}

impl fmt::Display for RestoreStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RestoreStage::Init => "init",
            RestoreStage::Unzipped => "unzipped",
            RestoreStage::DatabaseRestored => "database restored",
            RestoreStage::FilesRestored => "files restored",
            RestoreStage::Cleaned => "cleaned",
            RestoreStage::Done => "done",
        };
        f.write_str(s)
    }
}

/// Result of a successful create run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateReport {
    /// Backup identifier (`YYYY-MM-DD_HHMMSS`)
    pub identifier: String,
    pub archive_path: PathBuf,
    pub size_bytes: u64,
    /// SHA-256 of the archive, hex encoded
    pub sha256: String,
    /// Archives removed by retention
    pub pruned: PruneResult,
    pub warnings: Vec<String>,
    /// Full text of this run's log
    pub log: String,
}

/// Result of a restore run that got past unzipping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreReport {
    pub identifier: String,
    pub stage: RestoreStage,
    /// Files moved back, relative to the application root
    pub restored_files: Vec<String>,
    /// Files that could not be moved back
    pub failed_files: Vec<String>,
    /// Database restore failure, if any
    pub database_error: Option<String>,
    pub warnings: Vec<String>,
    /// Full text of this run's log
    pub log: String,
}

impl RestoreReport {
    pub fn has_errors(&self) -> bool {
        self.database_error.is_some() || !self.failed_files.is_empty()
    }
}

/// Result of a prune operation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PruneResult {
    /// Names of deleted backups
    pub deleted_names: Vec<String>,
    /// Number of backups retained
    pub retained_count: usize,
    /// Total bytes freed
    pub bytes_freed: u64,
}

/// Locks serializing mutating runs, keyed by backup directory
fn directory_lock(dir: &Path) -> Arc<Mutex<()>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    let key = lock_key(dir);
    let mut locks = LOCKS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    locks.entry(key).or_default().clone()
}

/// Canonical spelling of `dir`: the nearest existing ancestor is resolved,
/// the not-yet-created rest is appended as given
fn lock_key(dir: &Path) -> PathBuf {
    let dir: PathBuf = dir.components().collect();
    for ancestor in dir.ancestors() {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        if let (Ok(canonical), Ok(rest)) = (ancestor.canonicalize(), dir.strip_prefix(ancestor)) {
            return if rest.as_os_str().is_empty() {
                canonical
            } else {
                canonical.join(rest)
            };
        }
    }
    dir
}

/// Removes a staging directory when dropped, unless it was cleaned up
/// explicitly
struct StagingDir<'a> {
    fs: &'a dyn Filesystem,
    path: PathBuf,
    active: bool,
}

impl<'a> StagingDir<'a> {
    fn new(fs: &'a dyn Filesystem, path: PathBuf) -> Self {
        Self {
            fs,
            path,
            active: true,
        }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn cleanup(mut self) -> Result<()> {
        self.active = false;
        self.fs.remove(&self.path).map_err(|e| {
            Error::Runtime(format!(
                "Cannot remove temp dir '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}

impl Drop for StagingDir<'_> {
    fn drop(&mut self) {
        if self.active {
            if let Err(e) = self.fs.remove(&self.path) {
                tracing::warn!("Failed to remove temp dir {}: {}", self.path.display(), e);
            }
        }
    }
}

/// Creates, restores and manages backups of one application
pub struct BackupEngine {
    config: EngineConfig,
    fs: Arc<dyn Filesystem>,
    executor: Arc<dyn CommandExecutor>,
    lock: Arc<Mutex<()>>,
}

impl BackupEngine {
    pub fn new(
        config: EngineConfig,
        fs: Arc<dyn Filesystem>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        let lock = directory_lock(&config.backup_dir());
        Self {
            config,
            fs,
            executor,
            lock,
        }
    }

    /// Engine on the real filesystem, running real subprocesses
    pub fn local(config: EngineConfig) -> Self {
        let runner = SystemCommandRunner::with_timeout(config.backup.command_timeout());
        Self::new(config, Arc::new(LocalFilesystem::new()), Arc::new(runner))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn backup_dir(&self) -> PathBuf {
        self.config.backup_dir()
    }

    pub fn log_path(&self) -> PathBuf {
        self.backup_dir().join(LOG_FILE_NAME)
    }

    fn archive_path(&self, name: &BackupName) -> PathBuf {
        self.backup_dir().join(name.archive_file_name())
    }

    fn staging_path(&self, name: &BackupName) -> PathBuf {
        self.backup_dir().join(name.as_str())
    }

    fn acquire(&self) -> MutexGuard<'_, ()> {
        self.lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn database(&self) -> DatabaseBackend {
        DatabaseBackend::new(
            self.executor.clone(),
            self.config.backup.dump_command_template.clone(),
            self.config.backup.restore_command_template.clone(),
        )
        .with_workdir(self.config.app_root.clone())
    }

    /// Parsed database URL, `None` when no database is configured
    fn connection(&self) -> Result<Option<ConnectionInfo>> {
        match self.config.backup.database_url() {
            Some(url) => Ok(Some(ConnectionInfo::parse(url)?)),
            None => Ok(None),
        }
    }

    /// Delete one archive. Returns whether it existed.
    pub fn delete_backup(&self, name: &str) -> Result<bool> {
        let name = BackupName::parse(name)?;
        let _guard = self.acquire();

        let path = self.archive_path(&name);
        if !self.fs.exists(&path) {
            return Ok(false);
        }
        self.fs.remove(&path)?;
        tracing::info!("Deleted backup {}", name.archive_file_name());
        Ok(true)
    }

    /// Path of an existing archive, for download
    pub fn open_backup(&self, name: &str) -> Result<PathBuf> {
        let name = BackupName::parse(name)?;
        let path = self.archive_path(&name);
        if !self.fs.is_file(&path) {
            return Err(Error::NotFound(name.archive_file_name()));
        }
        Ok(path)
    }

    /// Contents of the last run's log, if any
    pub fn read_log(&self) -> Result<Option<String>> {
        let path = self.log_path();
        if !self.fs.is_file(&path) {
            return Ok(None);
        }
        Ok(Some(self.fs.read_to_string(&path)?))
    }
}
