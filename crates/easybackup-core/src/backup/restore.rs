use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use super::{BackupEngine, RestoreReport, RestoreStage, StagingDir, RESTORE_FINISH, RESTORE_START};
use crate::archive;
use crate::audit::{AuditLog, LogLevel};
use crate::database::{DbOutcome, SQL_DUMP_FILENAME};
use crate::error::{Error, Result};
use crate::manifest::MANIFEST_FILENAME;
use crate::path::{to_forward_slashes, BackupName};

/// Backup metadata that is never copied back into the application
const INTERNAL_FILES: &[&str] = &[MANIFEST_FILENAME, SQL_DUMP_FILENAME];

/// Files of an unpacked backup that belong to the application, relative
/// to `staging`
fn restorable_files(staging: &Path) -> impl Iterator<Item = PathBuf> + '_ {
    WalkDir::new(staging)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter_map(move |entry| entry.path().strip_prefix(staging).ok().map(Path::to_path_buf))
        .filter(|relative| {
            !(relative.components().count() == 1
                && relative
                    .to_str()
                    .is_some_and(|name| INTERNAL_FILES.contains(&name)))
        })
}

impl BackupEngine {
    /// Restore database and files from a backup.
    ///
    /// Fails before touching anything if the name is malformed or the
    /// archive cannot be unpacked. Once unpacked, a failing database
    /// restore or file move is logged and reported but does not stop the
    /// remaining steps.
    pub fn restore_backup(&self, name: &str) -> Result<RestoreReport> {
        let name = BackupName::parse(name)?;
        let _guard = self.acquire();

        let mut log = AuditLog::new(self.fs.clone(), &self.backup_dir());
        log.reset()?;
        log.info(RESTORE_START)?;

        let mut stage = RestoreStage::Init;
        match self.run_restore(&name, &mut log, &mut stage) {
            Ok(mut report) => {
                log.info(RESTORE_FINISH)?;
                report.warnings = log.messages(LogLevel::Warning);
                report.log = log.text();
                Ok(report)
            }
            Err(e) => {
                let _ = log.error(format!("Restore failed after stage '{}': {}", stage, e));
                Err(e)
            }
        }
    }

    fn run_restore(
        &self,
        name: &BackupName,
        log: &mut AuditLog,
        stage: &mut RestoreStage,
    ) -> Result<RestoreReport> {
        let archive_path = self.archive_path(name);
        let staging_path = self.staging_path(name);

        log.info(format!(
            "Start unzipping '{}' to '{}'.",
            archive_path.display(),
            staging_path.display()
        ))?;
        if !self.fs.is_file(&archive_path) {
            return Err(Error::NotFound(name.archive_file_name()));
        }
        self.fs.remove(&staging_path)?;
        let staging = StagingDir::new(self.fs.as_ref(), staging_path);
        let summary = archive::unpack(&archive_path, staging.path())?;
        if summary.skipped > 0 {
            log.warning(format!(
                "Skipped {} archive entries pointing outside the backup.",
                summary.skipped
            ))?;
        }
        *stage = RestoreStage::Unzipped;

        let database_error = match self.restore_database(staging.path(), log) {
            Ok(()) => None,
            Err(e) => {
                log.error(e.to_string())?;
                Some(e.to_string())
            }
        };
        *stage = RestoreStage::DatabaseRestored;

        let (restored_files, failed_files) = self.restore_files(staging.path(), log)?;
        *stage = RestoreStage::FilesRestored;

        log.info(format!("Remove temp dir '{}'.", staging.path().display()))?;
        staging.cleanup()?;
        *stage = RestoreStage::Cleaned;

        *stage = RestoreStage::Done;
        Ok(RestoreReport {
            identifier: name.to_string(),
            stage: *stage,
            restored_files,
            failed_files,
            database_error,
            warnings: Vec::new(),
            log: String::new(),
        })
    }

    fn restore_database(&self, staging: &Path, log: &mut AuditLog) -> Result<()> {
        let Some(info) = self.connection()? else {
            log.info("No database configured, skipping database restore.")?;
            return Ok(());
        };
        log.info(format!("Used database: '{}'.", info.scheme))?;

        let sql_path = staging.join(SQL_DUMP_FILENAME);
        match self.database().restore(&info, &sql_path)? {
            DbOutcome::Completed { bytes } => {
                log.info(format!(
                    "Database restored from '{}' ({} bytes).",
                    sql_path.display(),
                    bytes
                ))?;
            }
            DbOutcome::Skipped { scheme } => {
                log.info(format!(
                    "No dump restore for '{}' databases; data is restored with the files.",
                    scheme
                ))?;
            }
            DbOutcome::MissingDump(path) => {
                log.warning(format!(
                    "No database dump '{}' in backup, skipping database restore.",
                    path.display()
                ))?;
            }
        }
        Ok(())
    }

    /// Move every application file from `staging` under the application
    /// root. Returns (restored, failed) relative paths.
    fn restore_files(
        &self,
        staging: &Path,
        log: &mut AuditLog,
    ) -> Result<(Vec<String>, Vec<String>)> {
        let root = &self.config.app_root;
        let mut restored = Vec::new();
        let mut failed = Vec::new();

        for relative in restorable_files(staging) {
            let source = staging.join(&relative);
            let target = root.join(&relative);
            let display = to_forward_slashes(&relative);

            log.info(format!(
                "Copy '{}' to '{}'.",
                source.display(),
                target.display()
            ))?;

            if self.fs.is_file(&target) && !self.fs.is_writable(&target) {
                log.warning(format!(
                    "'{}' is not writable, relaxing permissions.",
                    target.display()
                ))?;
                if let Err(e) = self.fs.make_writable(&target) {
                    log.warning(format!(
                        "Cannot change permissions of '{}': {}",
                        target.display(),
                        e
                    ))?;
                }
            }

            match self.fs.rename(&source, &target) {
                Ok(()) => restored.push(display),
                Err(e) => {
                    log.error(format!(
                        "Cannot restore '{}': {}",
                        target.display(),
                        e
                    ))?;
                    failed.push(display);
                }
            }
        }
        Ok((restored, failed))
    }

    /// Unpack a backup into a scratch directory and list the files a
    /// restore would write, relative to the application root. Nothing in
    /// the application is touched.
    pub fn prepare_recovery(&self, name: &str) -> Result<Vec<String>> {
        let name = BackupName::parse(name)?;
        let _guard = self.acquire();

        let archive_path = self.archive_path(&name);
        if !self.fs.is_file(&archive_path) {
            return Err(Error::NotFound(name.archive_file_name()));
        }

        let scratch = self
            .backup_dir()
            .join(format!("{}.prepare", name.as_str()));
        self.fs.remove(&scratch)?;
        let staging = StagingDir::new(self.fs.as_ref(), scratch);
        archive::unpack(&archive_path, staging.path())?;

        let mut files: Vec<String> = restorable_files(staging.path())
            .map(|p| to_forward_slashes(&p))
            .collect();
        files.sort();

        staging.cleanup()?;
        Ok(files)
    }
}
