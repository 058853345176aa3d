use std::path::Path;

use serde::{Deserialize, Serialize};

use super::BackupEngine;
use crate::archive;
use crate::command::CommandOutput;
use crate::database::{tool_version_command, ConnectionInfo};

/// One line of the environment self-check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCheck {
    pub description: String,
    pub passed: bool,
    pub detail: String,
}

impl StatusCheck {
    fn new(description: impl Into<String>, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            passed,
            detail: detail.into(),
        }
    }
}

fn command_detail(output: &CommandOutput) -> String {
    match output.first_line() {
        Some(line) if output.success() => line.to_string(),
        _ if !output.stderr.is_empty() => output.stderr.clone(),
        _ => match output.exit_code {
            Some(code) => format!("exited with code {}", code),
            None => "did not run".to_string(),
        },
    }
}

impl BackupEngine {
    /// Check everything a backup run depends on. Never fails; problems are
    /// reported as checks that did not pass.
    pub fn check_status(&self) -> Vec<StatusCheck> {
        let root = &self.config.app_root;
        let backup_dir = self.backup_dir();
        let mut checks = vec![
            StatusCheck::new(
                format!("Path '{}' readable", root.display()),
                self.fs.is_readable(root),
                "",
            ),
            StatusCheck::new(
                format!("Path '{}' writable", root.display()),
                self.fs.is_writable(root),
                "",
            ),
            self.backup_dir_check(&backup_dir),
            StatusCheck::new(
                "ZIP archive support",
                archive::is_available(),
                "built in",
            ),
            StatusCheck::new("Application version", true, self.config.app.version.clone()),
        ];

        let git = self.config.backup.git_command.trim();
        if !git.is_empty() {
            let output = self.executor.execute(git, Some(root));
            checks.push(StatusCheck::new(git, output.success(), command_detail(&output)));
        }

        for template in [
            &self.config.backup.dump_command_template,
            &self.config.backup.restore_command_template,
        ] {
            match tool_version_command(template) {
                Some(command) => {
                    let output = self.executor.execute(&command, Some(root));
                    checks.push(StatusCheck::new(
                        command,
                        output.success(),
                        command_detail(&output),
                    ));
                }
                None => checks.push(StatusCheck::new(
                    "Database tool",
                    false,
                    "no command configured",
                )),
            }
        }

        checks.push(match self.config.backup.database_url() {
            Some(url) => match ConnectionInfo::parse(url) {
                Ok(info) => StatusCheck::new("Database", true, info.scheme),
                Err(e) => StatusCheck::new("Database", false, e.to_string()),
            },
            None => StatusCheck::new("Database", true, "not configured"),
        });

        let retention = match self.config.backup.retention_limit() {
            Some(n) => format!("keep newest {}", n),
            None => "keep all".to_string(),
        };
        checks.push(StatusCheck::new("Backup retention", true, retention));

        checks
    }

    fn backup_dir_check(&self, dir: &Path) -> StatusCheck {
        let description = format!("Backup directory '{}' writable", dir.display());
        if self.fs.is_dir(dir) {
            return StatusCheck::new(description, self.fs.is_writable(dir), "");
        }
        // Created on first backup; the nearest existing ancestor must allow it
        let ancestor = dir.ancestors().skip(1).find(|p| self.fs.is_dir(p));
        match ancestor {
            Some(parent) => StatusCheck::new(
                description,
                self.fs.is_writable(parent),
                "will be created",
            ),
            None => StatusCheck::new(description, false, "no existing parent directory"),
        }
    }
}
