//! Path normalization and backup name validation
//!
//! Every caller-supplied backup name passes through [`BackupName::parse`]
//! before it is joined onto a filesystem path. The accepted shapes are
//! `YYYY-MM-DD_HHMMSS` and `YYYY-MM-DD_HHMMSS.zip`, nothing else, which
//! rules out `..`, separators and absolute paths.

use std::fmt;
use std::path::{Path, PathBuf, MAIN_SEPARATOR};
use std::sync::OnceLock;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use regex::Regex;

use crate::error::{Error, Result};

/// strftime pattern for backup identifiers
pub const IDENTIFIER_FORMAT: &str = "%Y-%m-%d_%H%M%S";

/// Archive file extension (without dot)
pub const ARCHIVE_EXTENSION: &str = "zip";

fn archive_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}_\d{6}\.zip$").expect("valid regex"))
}

fn identifier_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{4}-\d{2}-\d{2}_\d{6}$").expect("valid regex"))
}

/// Replace both `/` and `\` with the platform separator. Pure, no I/O.
pub fn normalize(path: &str) -> PathBuf {
    let normalized: String = path
        .chars()
        .map(|c| if c == '/' || c == '\\' { MAIN_SEPARATOR } else { c })
        .collect();
    PathBuf::from(normalized)
}

/// Join a relative, possibly foreign-separated path onto a base directory
pub fn join_normalized(base: &Path, relative: &str) -> PathBuf {
    let relative = relative.trim_start_matches(['/', '\\']);
    base.join(normalize(relative))
}

/// Render a relative path with forward slashes (archive entry names, reports)
pub fn to_forward_slashes(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// True iff `s` is exactly `YYYY-MM-DD_HHMMSS.zip`
pub fn is_valid_archive_name(s: &str) -> bool {
    archive_name_re().is_match(s)
}

/// True iff `s` is exactly `YYYY-MM-DD_HHMMSS`
pub fn is_valid_identifier(s: &str) -> bool {
    identifier_re().is_match(s)
}

/// A validated backup identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BackupName(String);

impl BackupName {
    /// Accept either the bare identifier or the archive file name
    pub fn parse(input: &str) -> Result<Self> {
        if is_valid_archive_name(input) {
            let id = input
                .strip_suffix(".zip")
                .unwrap_or(input)
                .to_string();
            return Ok(Self(id));
        }
        if is_valid_identifier(input) {
            return Ok(Self(input.to_string()));
        }
        Err(Error::Validation(input.to_string()))
    }

    /// Identifier for a wall-clock instant
    pub fn from_time<Tz: TimeZone>(time: &DateTime<Tz>) -> Self
    where
        Tz::Offset: fmt::Display,
    {
        Self(time.format(IDENTIFIER_FORMAT).to_string())
    }

    /// Identifier for the current local time
    pub fn now() -> Self {
        Self::from_time(&Local::now())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `<id>.zip`
    pub fn archive_file_name(&self) -> String {
        format!("{}.{}", self.0, ARCHIVE_EXTENSION)
    }

    /// When the backup was taken, as encoded in the identifier
    pub fn timestamp(&self) -> Option<NaiveDateTime> {
        NaiveDateTime::parse_from_str(&self.0, IDENTIFIER_FORMAT).ok()
    }
}

impl fmt::Display for BackupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_archive_names() {
        assert!(is_valid_archive_name("2024-01-15_143022.zip"));
        assert!(!is_valid_archive_name("2024-01-15_143022"));
        assert!(!is_valid_archive_name("2024-01-15_14302.zip"));
        assert!(!is_valid_archive_name("x2024-01-15_143022.zip"));
        assert!(!is_valid_archive_name("2024-01-15_143022.zip.bak"));
    }

    #[test]
    fn test_rejects_traversal() {
        for bad in [
            "../2024-01-15_143022.zip",
            "2024-01-15_143022.zip/../../etc/passwd",
            "/etc/2024-01-15_143022.zip",
            "..\\2024-01-15_143022.zip",
            "2024-01-15_143022\n.zip",
            "",
            "..",
            "fake.zip",
        ] {
            assert!(BackupName::parse(bad).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_parse_accepts_both_forms() {
        let a = BackupName::parse("2024-01-15_143022.zip").unwrap();
        let b = BackupName::parse("2024-01-15_143022").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.archive_file_name(), "2024-01-15_143022.zip");
    }

    #[test]
    fn test_from_time_roundtrips_through_validation() {
        let time = chrono::Utc.with_ymd_and_hms(2020, 11, 2, 17, 44, 52).unwrap();
        let name = BackupName::from_time(&time);
        assert_eq!(name.as_str(), "2020-11-02_174452");
        assert!(is_valid_identifier(name.as_str()));
        assert_eq!(
            name.timestamp().unwrap().format("%H:%M:%S").to_string(),
            "17:44:52"
        );
    }

    #[test]
    fn test_normalize_separators() {
        let p = normalize("var\\data/file.txt");
        let expected: PathBuf = ["var", "data", "file.txt"].iter().collect();
        assert_eq!(p, expected);
    }

    #[test]
    fn test_join_normalized_strips_leading_separator() {
        let base = Path::new("root");
        assert_eq!(join_normalized(base, "/var/data"), base.join("var").join("data"));
    }

    #[test]
    fn test_forward_slashes() {
        let p: PathBuf = ["sub", "dir", "b.txt"].iter().collect();
        assert_eq!(to_forward_slashes(&p), "sub/dir/b.txt");
    }
}
