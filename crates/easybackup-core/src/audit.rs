//! Per-run audit log
//!
//! Each create/restore run starts a fresh `easybackup.log` in the backup
//! directory. Lines look like `[2024-01-15 14:30:22] INFO: message`. Every
//! entry is appended to the file immediately and mirrored to `tracing`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDateTime};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::fs::Filesystem;

/// Log file name inside the backup directory
pub const LOG_FILE_NAME: &str = "easybackup.log";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warning => "WARNING",
            LogLevel::Error => "ERROR",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditEntry {
    pub timestamp: NaiveDateTime,
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {}",
            self.timestamp.format(TIMESTAMP_FORMAT),
            self.level,
            self.message
        )
    }
}

pub struct AuditLog {
    fs: Arc<dyn Filesystem>,
    path: PathBuf,
    entries: Vec<AuditEntry>,
}

impl AuditLog {
    /// Log for the given backup directory. Nothing is touched until
    /// [`AuditLog::reset`] or the first entry.
    pub fn new(fs: Arc<dyn Filesystem>, backup_dir: &Path) -> Self {
        Self {
            fs,
            path: backup_dir.join(LOG_FILE_NAME),
            entries: Vec::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a new run: truncate the file and forget earlier entries
    pub fn reset(&mut self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            self.fs
                .create_dir_all(parent)
                .map_err(|e| self.unwritable(e))?;
        }
        self.fs.write(&self.path, b"").map_err(|e| self.unwritable(e))?;
        self.entries.clear();
        Ok(())
    }

    pub fn info(&mut self, message: impl Into<String>) -> Result<()> {
        self.append(LogLevel::Info, message.into())
    }

    pub fn warning(&mut self, message: impl Into<String>) -> Result<()> {
        self.append(LogLevel::Warning, message.into())
    }

    pub fn error(&mut self, message: impl Into<String>) -> Result<()> {
        self.append(LogLevel::Error, message.into())
    }

    fn append(&mut self, level: LogLevel, message: String) -> Result<()> {
        match level {
            LogLevel::Info => tracing::info!("{}", message),
            LogLevel::Warning => tracing::warn!("{}", message),
            LogLevel::Error => tracing::error!("{}", message),
        }

        let entry = AuditEntry {
            timestamp: Local::now().naive_local(),
            level,
            message,
        };
        let line = format!("{}\n", entry);
        self.fs
            .append(&self.path, line.as_bytes())
            .map_err(|e| self.unwritable(e))?;
        self.entries.push(entry);
        Ok(())
    }

    fn unwritable(&self, e: std::io::Error) -> Error {
        Error::Runtime(format!(
            "Cannot write log file '{}': {}",
            self.path.display(),
            e
        ))
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    /// Messages logged at `level`
    pub fn messages(&self, level: LogLevel) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.level == level)
            .map(|e| e.message.clone())
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        self.entries.iter().any(|e| e.level == LogLevel::Error)
    }

    /// The run's log text, as written to the file
    pub fn text(&self) -> String {
        self.entries.iter().map(|e| format!("{}\n", e)).collect()
    }
}
