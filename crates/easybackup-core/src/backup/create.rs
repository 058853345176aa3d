use std::fs::File;
use std::io;
use std::path::{Component, Path};

use sha2::{Digest, Sha256};

use super::{
    BackupEngine, CreateReport, CreateStage, StagingDir, CREATE_FINISH, CREATE_START,
    GITIGNORE_FILENAME,
};
use crate::archive;
use crate::audit::{AuditLog, LogLevel};
use crate::database::{DbOutcome, SQL_DUMP_FILENAME};
use crate::error::{Error, Result};
use crate::manifest::{Manifest, MANIFEST_FILENAME};
use crate::path::{join_normalized, BackupName};

impl BackupEngine {
    /// Create a new backup archive and apply retention
    pub fn create_backup(&self) -> Result<CreateReport> {
        let _guard = self.acquire();

        let backup_dir = self.backup_dir();
        self.fs.create_dir_all(&backup_dir).map_err(|e| {
            Error::Runtime(format!(
                "Cannot create backup directory '{}': {}",
                backup_dir.display(),
                e
            ))
        })?;

        let mut log = AuditLog::new(self.fs.clone(), &backup_dir);
        log.reset()?;
        log.info(CREATE_START)?;

        let mut stage = CreateStage::Init;
        match self.run_create(&mut log, &mut stage) {
            Ok(mut report) => {
                log.info(CREATE_FINISH)?;
                report.warnings = log.messages(LogLevel::Warning);
                report.log = log.text();
                Ok(report)
            }
            Err(e) => {
                // Keep the original error even if the log is gone
                let _ = log.error(format!("Backup failed after stage '{}': {}", stage, e));
                Err(e)
            }
        }
    }

    fn run_create(&self, log: &mut AuditLog, stage: &mut CreateStage) -> Result<CreateReport> {
        let name = BackupName::now();
        let archive_path = self.archive_path(&name);
        if self.fs.exists(&archive_path) {
            return Err(Error::Runtime(format!(
                "Backup '{}' already exists",
                name.archive_file_name()
            )));
        }

        let staging_path = self.staging_path(&name);
        log.info(format!("Creating backup dir '{}'.", staging_path.display()))?;
        self.fs.remove(&staging_path)?;
        self.fs.create_dir_all(&staging_path)?;
        let staging = StagingDir::new(self.fs.as_ref(), staging_path);

        self.ensure_gitignore(log)?;

        self.write_manifest(staging.path(), log)?;
        *stage = CreateStage::ManifestWritten;

        self.copy_paths(staging.path(), log)?;
        *stage = CreateStage::PathsCopied;

        let sql_path = staging.path().join(SQL_DUMP_FILENAME);
        self.dump_database(&sql_path, log)?;
        *stage = CreateStage::DatabaseDumped;

        log.info(format!(
            "Start zipping '{}' to '{}'.",
            staging.path().display(),
            archive_path.display()
        ))?;
        let summary = archive::pack(staging.path(), &archive_path)?;
        log.info(format!(
            "Zipped {} files and {} directories ({} bytes).",
            summary.files, summary.directories, summary.bytes
        ))?;
        *stage = CreateStage::Archived;

        log.info(format!("Remove temp file '{}'.", sql_path.display()))?;
        self.fs.remove(&sql_path)?;
        log.info(format!("Remove temp dir '{}'.", staging.path().display()))?;
        staging.cleanup()?;
        *stage = CreateStage::Cleaned;

        let size_bytes = std::fs::metadata(&archive_path).map(|m| m.len())?;
        let sha256 = sha256_file(&archive_path)?;

        let pruned = self.prune(log, &name.archive_file_name())?;
        *stage = CreateStage::RetentionApplied;
        *stage = CreateStage::Done;

        Ok(CreateReport {
            identifier: name.to_string(),
            archive_path,
            size_bytes,
            sha256,
            pruned,
            warnings: Vec::new(),
            log: String::new(),
        })
    }

    fn ensure_gitignore(&self, log: &mut AuditLog) -> Result<()> {
        let path = self.backup_dir().join(GITIGNORE_FILENAME);
        if !self.fs.exists(&path) {
            log.info(format!("Creating '{}'.", path.display()))?;
            self.fs.write(&path, b"*")?;
        }
        Ok(())
    }

    fn write_manifest(&self, staging: &Path, log: &mut AuditLog) -> Result<()> {
        let manifest = Manifest::new(&self.config.app, self.git_revision(log)?);
        let path = staging.join(MANIFEST_FILENAME);
        log.info(format!("Writing '{}'.", path.display()))?;
        self.fs.write(&path, manifest.to_json()?.as_bytes())?;
        Ok(())
    }

    fn git_revision(&self, log: &mut AuditLog) -> Result<Option<String>> {
        let command = self.config.backup.git_command.trim();
        if command.is_empty() {
            return Ok(None);
        }

        let output = self.executor.execute(command, Some(&self.config.app_root));
        match output.first_line() {
            Some(revision) if output.success() => Ok(Some(revision.to_string())),
            _ => {
                let reason = if output.stderr.is_empty() {
                    "no output".to_string()
                } else {
                    output.stderr.clone()
                };
                log.warning(format!("Cannot determine git revision: {}", reason))?;
                Ok(None)
            }
        }
    }

    fn copy_paths(&self, staging: &Path, log: &mut AuditLog) -> Result<()> {
        let root = &self.config.app_root;
        let backup_dir = self.backup_dir();

        for path in self.config.backup.paths() {
            if escapes_root(&path) {
                log.warning(format!(
                    "Path '{}' leaves the application root and is skipped.",
                    path
                ))?;
                continue;
            }

            let source = join_normalized(root, &path);
            let target = join_normalized(staging, &path);

            if self.fs.is_dir(&source) {
                log.info(format!(
                    "Mirror '{}' to '{}'.",
                    source.display(),
                    target.display()
                ))?;
                self.fs
                    .mirror(&source, &target, Some(&backup_dir))
                    .map_err(|e| copy_error(&source, e))?;
            } else if self.fs.is_file(&source) {
                log.info(format!(
                    "Copy '{}' to '{}'.",
                    source.display(),
                    target.display()
                ))?;
                self.fs
                    .copy_file(&source, &target)
                    .map_err(|e| copy_error(&source, e))?;
            } else {
                log.warning(format!(
                    "Path '{}' is not existing or not accessible.",
                    source.display()
                ))?;
            }
        }
        Ok(())
    }

    fn dump_database(&self, sql_path: &Path, log: &mut AuditLog) -> Result<()> {
        let Some(info) = self.connection()? else {
            log.info("No database configured, skipping database dump.")?;
            return Ok(());
        };
        log.info(format!("Used database: '{}'.", info.scheme))?;

        match self.database().dump(&info, sql_path)? {
            DbOutcome::Completed { bytes } => {
                log.info(format!(
                    "Database dump written to '{}' ({} bytes).",
                    sql_path.display(),
                    bytes
                ))?;
            }
            DbOutcome::Skipped { scheme } => {
                log.info(format!(
                    "No dump for '{}' databases; file-based data is covered by the backup paths.",
                    scheme
                ))?;
            }
            DbOutcome::MissingDump(_) => {}
        }
        Ok(())
    }
}

/// True for entries with `..` components
fn escapes_root(path: &str) -> bool {
    crate::path::normalize(path)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

fn copy_error(source: &Path, e: io::Error) -> Error {
    Error::Runtime(format!("Cannot copy '{}': {}", source.display(), e))
}

fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}
