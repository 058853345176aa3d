//! Server command implementation

use anyhow::Result;
use easybackup_core::BackupEngine;

pub async fn cmd_serve(engine: BackupEngine, host: &str, port: u16) -> Result<()> {
    println!("🚀 Starting EasyBackup web server...");
    println!("   Application: {}", engine.config().app_root.display());
    println!("   Backups: {}", engine.backup_dir().display());
    println!("   Listening: http://{}:{}", host, port);
    println!();
    println!("   ⚠️  No authentication - put an access-controlled proxy in front!");
    println!();
    println!("   Press Ctrl+C to stop");

    easybackup_server::serve(engine, host, port).await
}
