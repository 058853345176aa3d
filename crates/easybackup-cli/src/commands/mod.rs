//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `backup` - Backup commands (create, list, restore, delete, prepare, download)
//! - `serve` - Web server command
//! - `status` - Self-check and run log

pub mod backup;
pub mod serve;
pub mod status;

// Re-export command functions for main.rs
pub use backup::*;
pub use serve::*;
pub use status::*;

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use easybackup_core::{BackupConfiguration, BackupEngine, EngineConfig};
use tracing::debug;

/// Build the engine for an application root
pub fn open_engine(config_path: Option<&Path>, root: &Path) -> Result<BackupEngine> {
    let backup = BackupConfiguration::load(config_path).context("Failed to load configuration")?;
    let app_root = root
        .canonicalize()
        .with_context(|| format!("Application root not found: {}", root.display()))?;
    debug!("Application root: {}", app_root.display());

    Ok(BackupEngine::local(EngineConfig::new(app_root, backup)))
}

/// Ask a yes/no question on stdin; anything but "y" is a no
pub fn confirm(question: &str) -> Result<bool> {
    print!("{} [y/N] ", question);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

/// Format a byte size as human-readable
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
