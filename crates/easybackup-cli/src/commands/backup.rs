//! Backup management commands

use std::path::Path;

use anyhow::{Context, Result};
use easybackup_core::{BackupEngine, BackupName};

use super::{confirm, format_size};

/// Create a new backup
pub fn cmd_create(engine: &BackupEngine) -> Result<()> {
    println!("Creating backup...");
    println!("   Application: {}", engine.config().app_root.display());

    let report = engine.create_backup().context("Failed to create backup")?;

    println!("✅ Backup created: {}.zip", report.identifier);
    println!("   Location: {}", report.archive_path.display());
    println!("   Size: {}", format_size(report.size_bytes));
    println!("   SHA-256: {}", report.sha256);

    for warning in &report.warnings {
        println!("   ⚠️  {}", warning);
    }

    if !report.pruned.deleted_names.is_empty() {
        println!();
        println!(
            "Retention removed {} backup(s), freed {}:",
            report.pruned.deleted_names.len(),
            format_size(report.pruned.bytes_freed)
        );
        for name in &report.pruned.deleted_names {
            println!("  - {}", name);
        }
    }

    Ok(())
}

/// List available backups
pub fn cmd_list(engine: &BackupEngine) -> Result<()> {
    let backup_dir = engine.backup_dir();
    let backups = engine.list_backups().context("Failed to list backups")?;

    if backups.is_empty() {
        println!("No backups found");
        println!("Directory: {}", backup_dir.display());
        return Ok(());
    }

    println!("Available backups ({}):", backup_dir.display());
    println!();
    println!("{:<24} {:>12} {:>18}", "NAME", "SIZE", "MODIFIED");
    println!("{}", "-".repeat(56));

    for backup in backups {
        let modified = backup.modified_at.format("%Y-%m-%d %H:%M");
        println!(
            "{:<24} {:>12} {:>18}",
            backup.name,
            format_size(backup.size_bytes),
            modified
        );
    }

    Ok(())
}

/// Restore files and database from a backup
pub fn cmd_restore(engine: &BackupEngine, name: &str, yes: bool) -> Result<()> {
    let id = BackupName::parse(name)?;

    if !yes {
        println!(
            "⚠️  This will overwrite application files in {} and the configured database",
            engine.config().app_root.display()
        );
        if !confirm("Continue?")? {
            println!("Cancelled");
            return Ok(());
        }
    }

    println!("Restoring from backup: {}", id.archive_file_name());

    let report = engine
        .restore_backup(name)
        .context("Failed to restore backup")?;

    println!("   Files restored: {}", report.restored_files.len());
    for warning in &report.warnings {
        println!("   ⚠️  {}", warning);
    }

    if report.has_errors() {
        if let Some(err) = &report.database_error {
            println!("   ❌ Database: {}", err);
        }
        for file in &report.failed_files {
            println!("   ❌ Not restored: {}", file);
        }
        anyhow::bail!("Restore of {} finished with errors", report.identifier);
    }

    println!("✅ Restored from: {}", id.archive_file_name());
    Ok(())
}

/// Delete a backup
pub fn cmd_delete(engine: &BackupEngine, name: &str, yes: bool) -> Result<()> {
    let id = BackupName::parse(name)?;

    if !yes && !confirm(&format!("Delete {}?", id.archive_file_name()))? {
        println!("Cancelled");
        return Ok(());
    }

    if engine.delete_backup(name).context("Failed to delete backup")? {
        println!("✅ Deleted {}", id.archive_file_name());
    } else {
        println!("Backup {} does not exist", id.archive_file_name());
    }

    Ok(())
}

/// Show which files a restore would write
pub fn cmd_prepare(engine: &BackupEngine, name: &str) -> Result<()> {
    let files = engine
        .prepare_recovery(name)
        .context("Failed to read backup")?;

    if files.is_empty() {
        println!("Backup contains no application files");
        return Ok(());
    }

    println!("Restoring would write {} file(s):", files.len());
    for file in files {
        println!("  {}", file);
    }

    Ok(())
}

/// Copy an archive out of the backup directory
pub fn cmd_download(engine: &BackupEngine, name: &str, output: &Path) -> Result<()> {
    let source = engine.open_backup(name)?;

    let bytes = std::fs::copy(&source, output)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!("✅ Saved {} ({})", output.display(), format_size(bytes));
    Ok(())
}
