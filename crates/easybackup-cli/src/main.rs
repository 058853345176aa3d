//! EasyBackup CLI
//!
//! Usage:
//!   easybackup create                 Back up files and database
//!   easybackup list                   List backups, newest first
//!   easybackup restore NAME           Restore a backup over the application
//!   easybackup serve --port 3000      Start web server

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let engine = commands::open_engine(cli.config.as_deref(), &cli.root)?;

    match cli.command {
        Commands::Create => commands::cmd_create(&engine),
        Commands::List => commands::cmd_list(&engine),
        Commands::Restore { name, yes } => commands::cmd_restore(&engine, &name, yes),
        Commands::Delete { name, yes } => commands::cmd_delete(&engine, &name, yes),
        Commands::Prepare { name } => commands::cmd_prepare(&engine, &name),
        Commands::Download { name, output } => commands::cmd_download(&engine, &name, &output),
        Commands::Status => commands::cmd_status(&engine),
        Commands::Log => commands::cmd_log(&engine),
        Commands::Serve { port, host } => commands::cmd_serve(engine, &host, port).await,
    }
}
