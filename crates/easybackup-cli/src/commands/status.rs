//! Status and log commands

use anyhow::{Context, Result};
use easybackup_core::BackupEngine;

pub fn cmd_status(engine: &BackupEngine) -> Result<()> {
    println!();
    println!("📊 EasyBackup Status");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Application: {}", engine.config().app_root.display());
    println!("   Backups: {}", engine.backup_dir().display());
    println!();

    let checks = engine.check_status();
    for check in &checks {
        let mark = if check.passed { "✅" } else { "❌" };
        if check.detail.is_empty() {
            println!("   {} {}", mark, check.description);
        } else {
            println!("   {} {}: {}", mark, check.description, check.detail);
        }
    }

    let failed = checks.iter().filter(|c| !c.passed).count();
    println!();
    if failed > 0 {
        println!("   {} check(s) failed", failed);
    } else {
        println!("   All checks passed");
    }
    println!();

    Ok(())
}

/// Print the log of the last run
pub fn cmd_log(engine: &BackupEngine) -> Result<()> {
    match engine.read_log().context("Failed to read log")? {
        Some(log) => print!("{}", log),
        None => println!("No backup or restore has run yet"),
    }
    Ok(())
}
