//! Error types for EasyBackup

use std::path::PathBuf;

use thiserror::Error;

/// Failures while packing or unpacking a backup archive
#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Archive source not found: {}", .0.display())]
    SourceMissing(PathBuf),

    #[error("Cannot open archive destination for writing: {}", .0.display())]
    DestUnwritable(PathBuf),

    #[error("Archiving capability is not available")]
    CapabilityMissing,

    #[error("Zip error: {0}")]
    Zip(String),
}

impl From<zip::result::ZipError> for ArchiveError {
    fn from(err: zip::result::ZipError) -> Self {
        ArchiveError::Zip(err.to_string())
    }
}

/// Failures reported by the external database tools
#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database dump failed: {0}")]
    DumpFailed(String),

    #[error("Database restore failed: {0}")]
    RestoreFailed(String),

    #[error("Database tool printed usage text instead of running: {0}")]
    UsageText(String),

    #[error("Invalid database URL: {0}")]
    InvalidUrl(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid backup name: {0}")]
    Validation(String),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("{0}")]
    Runtime(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for malformed caller input that never reached the filesystem
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
