use chrono::{DateTime, Utc};

use super::{BackupEngine, BackupInfo, PruneResult};
use crate::audit::AuditLog;
use crate::error::Result;
use crate::path::is_valid_archive_name;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Archives to delete so that at most `keep` remain: the oldest by
/// modification time, ties broken by name
pub fn select_for_removal(backups: &[BackupInfo], keep: usize) -> Vec<&BackupInfo> {
    if backups.len() <= keep {
        return Vec::new();
    }
    let mut by_age: Vec<&BackupInfo> = backups.iter().collect();
    by_age.sort_by(|a, b| {
        a.modified_at
            .cmp(&b.modified_at)
            .then_with(|| a.name.cmp(&b.name))
    });
    by_age.truncate(backups.len() - keep);
    by_age
}

fn round_mb(bytes: u64) -> f64 {
    (bytes as f64 / BYTES_PER_MB * 1000.0).round() / 1000.0
}

impl BackupEngine {
    /// Archives in the backup directory, newest name first.
    ///
    /// Only files named `YYYY-MM-DD_HHMMSS.zip` are listed; the log, the
    /// ignore file and staging directories never show up.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        let dir = self.backup_dir();
        if !self.fs.is_dir(&dir) {
            return Ok(Vec::new());
        }

        let mut backups: Vec<BackupInfo> = self
            .fs
            .list_dir(&dir)?
            .into_iter()
            .filter(|entry| entry.is_file && is_valid_archive_name(&entry.name))
            .map(|entry| BackupInfo {
                size_mb: round_mb(entry.size),
                size_bytes: entry.size,
                modified_at: DateTime::<Utc>::from(entry.modified),
                name: entry.name,
            })
            .collect();

        backups.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(backups)
    }

    /// Apply the configured retention limit. `current` is the archive just
    /// written; it counts toward the limit but is never removed.
    pub(super) fn prune(&self, log: &mut AuditLog, current: &str) -> Result<PruneResult> {
        let backups = self.list_backups()?;
        let Some(keep) = self.config.backup.retention_limit() else {
            return Ok(PruneResult {
                retained_count: backups.len(),
                ..Default::default()
            });
        };

        let (kept, others): (Vec<BackupInfo>, Vec<BackupInfo>) =
            backups.iter().cloned().partition(|b| b.name == current);
        let keep_others = keep.saturating_sub(kept.len());

        let mut result = PruneResult::default();
        for backup in select_for_removal(&others, keep_others) {
            let path = self.backup_dir().join(&backup.name);
            log.info(format!("Delete old backup '{}'.", path.display()))?;
            if let Err(e) = self.fs.remove(&path) {
                log.warning(format!("Failed to delete backup '{}': {}", backup.name, e))?;
                continue;
            }
            result.bytes_freed += backup.size_bytes;
            result.deleted_names.push(backup.name.clone());
        }
        result.retained_count = backups.len() - result.deleted_names.len();
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn info(name: &str, minute: u32) -> BackupInfo {
        BackupInfo {
            name: name.to_string(),
            size_bytes: 10,
            size_mb: 0.0,
            modified_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, minute, 0).unwrap(),
        }
    }

    #[test]
    fn test_select_oldest_by_mtime() {
        // Names deliberately disagree with modification order
        let backups = vec![
            info("2024-01-03_000000.zip", 1),
            info("2024-01-01_000000.zip", 3),
            info("2024-01-02_000000.zip", 2),
        ];
        let removed: Vec<&str> = select_for_removal(&backups, 1)
            .iter()
            .map(|b| b.name.as_str())
            .collect();
        assert_eq!(removed, vec!["2024-01-03_000000.zip", "2024-01-02_000000.zip"]);
    }

    #[test]
    fn test_select_nothing_under_limit() {
        let backups = vec![info("2024-01-01_000000.zip", 1)];
        assert!(select_for_removal(&backups, 1).is_empty());
        assert!(select_for_removal(&backups, 5).is_empty());
    }

    #[test]
    fn test_round_mb() {
        assert_eq!(round_mb(1024 * 1024), 1.0);
        assert_eq!(round_mb(1536 * 1024), 1.5);
        assert_eq!(round_mb(1000), 0.001);
        assert_eq!(round_mb(0), 0.0);
    }
}
