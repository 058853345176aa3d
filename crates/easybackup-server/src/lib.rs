//! EasyBackup Web Server
//!
//! Axum-based REST API in front of the backup engine.
//!
//! - Engine calls run on the blocking thread pool
//! - Sanitized error responses (validation 400, unknown backup 404)
//! - Security headers on every response
//!
//! There is no authentication layer. Put the server behind an access
//! controlled reverse proxy before exposing it.

use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use easybackup_core::BackupEngine;

mod handlers;

/// Shared application state
pub struct AppState {
    pub engine: Arc<BackupEngine>,
}

impl AppState {
    /// Run an engine call on the blocking pool and map its error
    pub(crate) async fn run<T, F>(&self, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&BackupEngine) -> easybackup_core::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let engine = self.engine.clone();
        tokio::task::spawn_blocking(move || f(&engine))
            .await?
            .map_err(AppError::from_engine)
    }
}

/// Create the application router
pub fn create_router(engine: BackupEngine) -> Router {
    let state = Arc::new(AppState {
        engine: Arc::new(engine),
    });

    let api_routes = Router::new()
        .route(
            "/backups",
            get(handlers::list_backups).post(handlers::create_backup),
        )
        .route(
            "/backups/:name",
            get(handlers::download_backup).delete(handlers::delete_backup),
        )
        .route("/backups/:name/restore", post(handlers::restore_backup))
        .route("/backups/:name/prepare", get(handlers::prepare_recovery))
        .route("/status", get(handlers::get_status))
        .route("/log", get(handlers::get_log));

    Router::new()
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        // Security headers
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
}

/// Start the server
pub async fn serve(engine: BackupEngine, host: &str, port: u16) -> anyhow::Result<()> {
    warn!("Authentication is not enforced - do not expose to network!");
    info!("Backup directory: {}", engine.backup_dir().display());

    let app = create_router(engine);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn internal(msg: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.to_string(),
            internal: None,
        }
    }

    /// Map an engine error to a response status
    pub fn from_engine(err: easybackup_core::Error) -> Self {
        use easybackup_core::Error;

        match &err {
            Error::Validation(_) => Self::bad_request(&err.to_string()),
            Error::NotFound(_) => Self::not_found(&err.to_string()),
            // Run failures are operator-facing; the message names the cause
            _ => Self::internal(&err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        } else if self.status.is_server_error() {
            error!(error = %self.message, "Request failed");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
