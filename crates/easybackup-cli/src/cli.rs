//! CLI argument definitions using clap
//!
//! The command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// EasyBackup - Back up and restore an application's files and database
#[derive(Parser)]
#[command(name = "easybackup")]
#[command(about = "Backup and restore for self-hosted applications", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file (defaults to the user data directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Application root the backup paths are relative to
    #[arg(long, default_value = ".", global = true)]
    pub root: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new backup
    Create,

    /// List available backups
    List,

    /// Restore files and database from a backup
    Restore {
        /// Backup name, with or without the .zip extension
        name: String,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Delete a backup
    Delete {
        /// Backup name, with or without the .zip extension
        name: String,

        /// Skip confirmation prompt
        #[arg(long, short = 'y')]
        yes: bool,
    },

    /// Show which files a restore would write
    Prepare {
        /// Backup name, with or without the .zip extension
        name: String,
    },

    /// Copy a backup archive out of the backup directory
    Download {
        /// Backup name, with or without the .zip extension
        name: String,

        /// Destination file
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Check that backups can be created and restored
    Status,

    /// Print the log of the last backup or restore run
    Log,

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },
}
