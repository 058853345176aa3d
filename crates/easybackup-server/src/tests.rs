//! Server API tests

use super::*;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use easybackup_core::test_utils::ScriptedExecutor;
use easybackup_core::{BackupConfiguration, EngineConfig, LocalFilesystem};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::ServiceExt;

fn setup_test_app() -> (TempDir, Router) {
    let root = TempDir::new().unwrap();
    std::fs::write(root.path().join(".env"), "APP_SECRET=abc\n").unwrap();
    std::fs::create_dir_all(root.path().join("var/data")).unwrap();
    std::fs::write(root.path().join("var/data/app.sqlite"), "db").unwrap();

    let backup = BackupConfiguration {
        paths_to_backup: ".env\nvar/data/".to_string(),
        database_url: None,
        ..BackupConfiguration::embedded().unwrap()
    };
    let executor = ScriptedExecutor::new().respond_stdout("git", "abc123");
    let engine = BackupEngine::new(
        EngineConfig::new(root.path(), backup),
        Arc::new(LocalFilesystem::new()),
        Arc::new(executor),
    );
    (root, create_router(engine))
}

async fn get_body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body();
    let bytes = body.collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn request(method: &str, uri: &str) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

/// Create a backup through the API and return its archive name
async fn create_backup(app: &Router) -> String {
    let response = app
        .clone()
        .oneshot(request("POST", "/api/backups"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    json["name"].as_str().unwrap().to_string()
}

// ========== Backup API Tests ==========

#[tokio::test]
async fn test_list_backups_empty() {
    let (_root, app) = setup_test_app();

    let response = app.oneshot(request("GET", "/api/backups")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json, serde_json::json!([]));
}

#[tokio::test]
async fn test_create_and_list_backup() {
    let (_root, app) = setup_test_app();

    let response = app
        .clone()
        .oneshot(request("POST", "/api/backups"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let created = get_body_json(response).await;
    let name = created["name"].as_str().unwrap();
    assert!(easybackup_core::path::is_valid_archive_name(name));
    assert_eq!(created["sha256"].as_str().unwrap().len(), 64);
    assert!(created["log"].as_str().unwrap().contains("S T A R T"));

    let response = app.oneshot(request("GET", "/api/backups")).await.unwrap();
    let json = get_body_json(response).await;
    let backups = json.as_array().unwrap();
    assert_eq!(backups.len(), 1);
    assert_eq!(backups[0]["name"], name);
    assert!(backups[0]["modified_at"].is_string());
}

#[tokio::test]
async fn test_download_backup() {
    let (_root, app) = setup_test_app();
    let name = create_backup(&app).await;

    let response = app
        .oneshot(request("GET", &format!("/api/backups/{}", name)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "application/zip"
    );
    assert_eq!(
        response.headers()["content-disposition"].to_str().unwrap(),
        format!("attachment; filename=\"{}\"", name)
    );
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert!(bytes.starts_with(b"PK"));
}

#[tokio::test]
async fn test_download_invalid_name_is_bad_request() {
    let (_root, app) = setup_test_app();

    let response = app
        .oneshot(request("GET", "/api/backups/..%2F..%2Fetc%2Fpasswd"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = get_body_json(response).await;
    assert!(json["error"].as_str().unwrap().contains("Invalid backup name"));
}

#[tokio::test]
async fn test_download_missing_backup_is_not_found() {
    let (_root, app) = setup_test_app();

    let response = app
        .oneshot(request("GET", "/api/backups/2020-01-01_000000.zip"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_backup() {
    let (_root, app) = setup_test_app();
    let name = create_backup(&app).await;

    let response = app
        .clone()
        .oneshot(request("DELETE", &format!("/api/backups/{}", name)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["deleted"], true);

    // Deleting again is not an error
    let response = app
        .oneshot(request("DELETE", &format!("/api/backups/{}", name)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["deleted"], false);
}

#[tokio::test]
async fn test_restore_backup() {
    let (root, app) = setup_test_app();
    let name = create_backup(&app).await;
    std::fs::write(root.path().join(".env"), "APP_SECRET=changed\n").unwrap();

    let response = app
        .oneshot(request("POST", &format!("/api/backups/{}/restore", name)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["failed_files"], serde_json::json!([]));
    assert!(json["database_error"].is_null());
    assert_eq!(
        std::fs::read_to_string(root.path().join(".env")).unwrap(),
        "APP_SECRET=abc\n"
    );
}

#[tokio::test]
async fn test_restore_invalid_and_missing() {
    let (_root, app) = setup_test_app();

    let response = app
        .clone()
        .oneshot(request("POST", "/api/backups/latest/restore"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(request("POST", "/api/backups/2020-01-01_000000/restore"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_prepare_recovery() {
    let (_root, app) = setup_test_app();
    let name = create_backup(&app).await;

    let response = app
        .oneshot(request("GET", &format!("/api/backups/{}/prepare", name)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    assert_eq!(json["name"], name);
    assert_eq!(
        json["files"],
        serde_json::json!([".env", "var/data/app.sqlite"])
    );
}

// ========== Status and Log Tests ==========

#[tokio::test]
async fn test_status() {
    let (_root, app) = setup_test_app();

    let response = app.oneshot(request("GET", "/api/status")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = get_body_json(response).await;
    let checks = json["checks"].as_array().unwrap();
    assert!(checks
        .iter()
        .any(|c| c["description"] == "ZIP archive support" && c["passed"] == true));
    assert!(json["ok"].is_boolean());
}

#[tokio::test]
async fn test_log_before_and_after_run() {
    let (_root, app) = setup_test_app();

    let response = app
        .clone()
        .oneshot(request("GET", "/api/log"))
        .await
        .unwrap();
    let json = get_body_json(response).await;
    assert!(json["log"].is_null());

    create_backup(&app).await;

    let response = app.oneshot(request("GET", "/api/log")).await.unwrap();
    let json = get_body_json(response).await;
    assert!(json["log"]
        .as_str()
        .unwrap()
        .contains("F I N I S H E D   C R E A T I N G"));
}

#[tokio::test]
async fn test_security_headers() {
    let (_root, app) = setup_test_app();

    let response = app.oneshot(request("GET", "/api/backups")).await.unwrap();

    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert_eq!(response.headers()["x-frame-options"], "DENY");
}
