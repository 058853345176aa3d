//! Backup API handlers

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::info;

use easybackup_core::{BackupName, RestoreReport};

use crate::{AppError, AppState};

/// Create backup response
#[derive(Debug, Serialize)]
pub struct CreateBackupResponse {
    pub name: String,
    pub size: u64,
    pub sha256: String,
    /// Archives deleted by retention
    pub deleted: Vec<String>,
    pub warnings: Vec<String>,
    pub log: String,
}

/// List backups response
#[derive(Debug, Serialize)]
pub struct BackupInfo {
    pub name: String,
    pub size: u64,
    pub size_mb: f64,
    pub modified_at: String,
}

/// Delete response
#[derive(Debug, Serialize)]
pub struct DeleteBackupResponse {
    pub name: String,
    /// False when the archive was already gone
    pub deleted: bool,
}

/// Recovery preview response
#[derive(Debug, Serialize)]
pub struct PrepareRecoveryResponse {
    pub name: String,
    pub files: Vec<String>,
}

/// List available backups
pub async fn list_backups(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BackupInfo>>, AppError> {
    let backups = state.run(|engine| engine.list_backups()).await?;

    let response: Vec<BackupInfo> = backups
        .into_iter()
        .map(|b| BackupInfo {
            name: b.name,
            size: b.size_bytes,
            size_mb: b.size_mb,
            modified_at: b.modified_at.to_rfc3339(),
        })
        .collect();

    Ok(Json(response))
}

/// Create a backup
pub async fn create_backup(
    State(state): State<Arc<AppState>>,
) -> Result<Json<CreateBackupResponse>, AppError> {
    let report = state.run(|engine| engine.create_backup()).await?;

    info!(
        "Backup created via API: {} ({} bytes)",
        report.identifier, report.size_bytes
    );

    Ok(Json(CreateBackupResponse {
        name: format!("{}.zip", report.identifier),
        size: report.size_bytes,
        sha256: report.sha256,
        deleted: report.pruned.deleted_names,
        warnings: report.warnings,
        log: report.log,
    }))
}

/// Download a backup archive
pub async fn download_backup(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    let path = state.run(move |engine| engine.open_backup(&name)).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let bytes = tokio::fs::read(&path).await?;

    Ok((
        [
            (header::CONTENT_TYPE, "application/zip".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file_name),
            ),
        ],
        Body::from(bytes),
    )
        .into_response())
}

/// Delete a backup
pub async fn delete_backup(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<DeleteBackupResponse>, AppError> {
    let id = BackupName::parse(&name).map_err(AppError::from_engine)?;
    let deleted = state.run(move |engine| engine.delete_backup(&name)).await?;

    info!("Backup delete via API: {} (deleted={})", id, deleted);

    Ok(Json(DeleteBackupResponse {
        name: id.archive_file_name(),
        deleted,
    }))
}

/// Restore application files and database from a backup
pub async fn restore_backup(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<RestoreReport>, AppError> {
    let report = state.run(move |engine| engine.restore_backup(&name)).await?;

    if report.has_errors() {
        tracing::warn!(
            "Restore of {} finished with errors ({} files failed)",
            report.identifier,
            report.failed_files.len()
        );
    } else {
        info!(
            "Restore of {} finished: {} files",
            report.identifier,
            report.restored_files.len()
        );
    }

    Ok(Json(report))
}

/// List the files a restore would write
pub async fn prepare_recovery(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<PrepareRecoveryResponse>, AppError> {
    let id = BackupName::parse(&name).map_err(AppError::from_engine)?;
    let files = state
        .run(move |engine| engine.prepare_recovery(&name))
        .await?;

    Ok(Json(PrepareRecoveryResponse {
        name: id.archive_file_name(),
        files,
    }))
}
