//! Environment check and run log handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use easybackup_core::StatusCheck;

use crate::{AppError, AppState};

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// True when every check passed
    pub ok: bool,
    pub checks: Vec<StatusCheck>,
}

/// Log response
#[derive(Debug, Serialize)]
pub struct LogResponse {
    /// Last create/restore run log, absent before the first run
    pub log: Option<String>,
}

/// Run the environment self-check
pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, AppError> {
    let checks = state.run(|engine| Ok(engine.check_status())).await?;

    Ok(Json(StatusResponse {
        ok: checks.iter().all(|c| c.passed),
        checks,
    }))
}

/// Return the log of the last run
pub async fn get_log(State(state): State<Arc<AppState>>) -> Result<Json<LogResponse>, AppError> {
    let log = state.run(|engine| engine.read_log()).await?;
    Ok(Json(LogResponse { log }))
}
