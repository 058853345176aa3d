//! EasyBackup Core Library
//!
//! Backup and restore of an application's data directory and database:
//! - Backup name validation and path normalization
//! - Subprocess execution for mysqldump/mysql and git
//! - ZIP archive packing and unpacking
//! - Database dump and restore via command templates
//! - Backup engine with retention, recovery preview and self-check
//! - Per-run audit log

pub mod archive;
pub mod audit;
pub mod backup;
pub mod command;
pub mod config;
pub mod database;
pub mod error;
pub mod fs;
pub mod manifest;
pub mod path;

/// Test utilities: scripted command executor and recording filesystem
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use archive::{PackSummary, UnpackSummary};
pub use audit::{AuditEntry, AuditLog, LogLevel, LOG_FILE_NAME};
pub use backup::{
    BackupEngine, BackupInfo, CreateReport, CreateStage, PruneResult, RestoreReport,
    RestoreStage, StatusCheck,
};
pub use command::{CommandExecutor, CommandOutput, SystemCommandRunner};
pub use config::{AppInfo, BackupConfiguration, EngineConfig};
pub use database::{ConnectionInfo, DatabaseBackend, DbOutcome};
pub use error::{ArchiveError, DbError, Error, Result};
pub use fs::{Filesystem, LocalFilesystem};
pub use manifest::Manifest;
pub use path::BackupName;
