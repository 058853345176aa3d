//! Filesystem abstraction used by the engine and the audit log
//!
//! All reads and writes the engine performs go through [`Filesystem`], so a
//! test can wrap [`LocalFilesystem`] and observe exactly which paths were
//! touched. Archive packing and subprocess execution use std directly; they
//! only ever see paths the engine already validated.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use walkdir::WalkDir;

/// Metadata for one directory entry
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub path: PathBuf,
    pub name: String,
    pub is_file: bool,
    pub size: u64,
    pub modified: SystemTime,
}

/// Filesystem operations needed by a backup run
pub trait Filesystem: Send + Sync {
    fn exists(&self, path: &Path) -> bool;

    fn is_dir(&self, path: &Path) -> bool;

    fn is_file(&self, path: &Path) -> bool;

    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Remove a file or a whole tree. Absent paths are not an error.
    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Create or truncate `path` with `contents`
    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    /// Append to `path`, creating it when absent
    fn append(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Copy a single file, creating parent directories of `to`
    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Recursively copy a directory tree onto `to`, leaving out `skip`
    /// and everything below it
    fn mirror(&self, from: &Path, to: &Path, skip: Option<&Path>) -> io::Result<()>;

    /// Move a file, overwriting `to` and creating its parent directories
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Direct children of a directory
    fn list_dir(&self, path: &Path) -> io::Result<Vec<FileEntry>>;

    fn is_readable(&self, path: &Path) -> bool;

    fn is_writable(&self, path: &Path) -> bool;

    /// Clear the read-only flag on `path`
    fn make_writable(&self, path: &Path) -> io::Result<()>;
}

/// The real, std-backed filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFilesystem;

impl LocalFilesystem {
    pub fn new() -> Self {
        Self
    }
}

impl Filesystem for LocalFilesystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn is_file(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        match fs::symlink_metadata(path) {
            Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
            Ok(_) => fs::remove_file(path),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        fs::write(path, contents)
    }

    fn append(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        file.write_all(contents)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        fs::read_to_string(path)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(from, to).map(|_| ())
    }

    fn mirror(&self, from: &Path, to: &Path, skip: Option<&Path>) -> io::Result<()> {
        fs::create_dir_all(to)?;
        let walker = WalkDir::new(from)
            .min_depth(1)
            .into_iter()
            .filter_entry(|e| skip.map_or(true, |s| !e.path().starts_with(s)));
        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            let relative = entry
                .path()
                .strip_prefix(from)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            let target = to.join(relative);
            if entry.file_type().is_dir() {
                fs::create_dir_all(&target)?;
            } else if entry.file_type().is_file() {
                fs::copy(entry.path(), &target)?;
            }
        }
        Ok(())
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        match fs::rename(from, to) {
            Ok(()) => Ok(()),
            // Cross-device moves: copy then delete the source
            Err(_) if from.is_file() => {
                fs::copy(from, to)?;
                fs::remove_file(from)
            }
            Err(e) => Err(e),
        }
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<FileEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            entries.push(FileEntry {
                path: entry.path(),
                name: entry.file_name().to_string_lossy().to_string(),
                is_file: metadata.is_file(),
                size: metadata.len(),
                modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            });
        }
        Ok(entries)
    }

    fn is_readable(&self, path: &Path) -> bool {
        if path.is_dir() {
            fs::read_dir(path).is_ok()
        } else {
            fs::File::open(path).is_ok()
        }
    }

    fn is_writable(&self, path: &Path) -> bool {
        match fs::metadata(path) {
            // Permission bits only; nothing is created inside the directory
            Ok(meta) if meta.is_dir() => !meta.permissions().readonly(),
            Ok(meta) => {
                !meta.permissions().readonly()
                    && OpenOptions::new().append(true).open(path).is_ok()
            }
            Err(_) => false,
        }
    }

    fn make_writable(&self, path: &Path) -> io::Result<()> {
        let mut permissions = fs::metadata(path)?.permissions();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = permissions.mode();
            permissions.set_mode(mode | 0o200);
        }
        #[cfg(not(unix))]
        {
            #[allow(clippy::permissions_set_readonly_false)]
            permissions.set_readonly(false);
        }
        fs::set_permissions(path, permissions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_remove_absent_is_ok() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new();
        assert!(fs.remove(&dir.path().join("missing")).is_ok());
    }

    #[test]
    fn test_remove_tree() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new();
        let tree = dir.path().join("a");
        fs.create_dir_all(&tree.join("b")).unwrap();
        fs.write(&tree.join("b").join("c.txt"), b"c").unwrap();

        fs.remove(&tree).unwrap();
        assert!(!tree.exists());
    }

    #[test]
    fn test_mirror_copies_nested_files() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new();
        let src = dir.path().join("src");
        fs.create_dir_all(&src.join("nested").join("empty")).unwrap();
        fs.write(&src.join("top.txt"), b"top").unwrap();
        fs.write(&src.join("nested").join("deep.txt"), b"deep").unwrap();

        let dst = dir.path().join("dst");
        fs.mirror(&src, &dst, None).unwrap();

        assert_eq!(fs::read_to_string(dst.join("top.txt")).unwrap(), "top");
        assert_eq!(
            fs::read_to_string(dst.join("nested").join("deep.txt")).unwrap(),
            "deep"
        );
        assert!(dst.join("nested").join("empty").is_dir());
    }

    #[test]
    fn test_mirror_skips_excluded_subtree() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new();
        let src = dir.path().join("var");
        fs.create_dir_all(&src.join("easy_backup").join("2024-01-01_000000"))
            .unwrap();
        fs.write(&src.join("easy_backup").join("old.zip"), b"zip").unwrap();
        fs.write(&src.join("keep.txt"), b"keep").unwrap();

        let dst = dir.path().join("dst");
        fs.mirror(&src, &dst, Some(&src.join("easy_backup"))).unwrap();

        assert!(dst.join("keep.txt").is_file());
        assert!(!dst.join("easy_backup").exists());
    }

    #[test]
    fn test_rename_creates_parents_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new();
        let from = dir.path().join("from.txt");
        let to = dir.path().join("x").join("y").join("to.txt");
        fs.write(&from, b"new").unwrap();
        fs.create_dir_all(to.parent().unwrap()).unwrap();
        fs.write(&to, b"old").unwrap();

        fs.rename(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "new");
    }

    #[test]
    fn test_append_creates_file() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new();
        let path = dir.path().join("log.txt");
        fs.append(&path, b"one\n").unwrap();
        fs.append(&path, b"two\n").unwrap();
        assert_eq!(fs.read_to_string(&path).unwrap(), "one\ntwo\n");
    }

    #[cfg(unix)]
    #[test]
    fn test_make_writable_clears_readonly() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new();
        let path = dir.path().join("locked.txt");
        fs.write(&path, b"x").unwrap();

        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&path, perms).unwrap();
        assert!(std::fs::metadata(&path).unwrap().permissions().readonly());

        fs.make_writable(&path).unwrap();
        assert!(!std::fs::metadata(&path).unwrap().permissions().readonly());
    }

    #[cfg(unix)]
    #[test]
    fn test_is_writable_dir_leaves_no_trace() {
        let dir = TempDir::new().unwrap();
        let fs = LocalFilesystem::new();
        let app = dir.path().join("app");
        fs.create_dir_all(&app).unwrap();

        assert!(fs.is_writable(&app));
        assert_eq!(std::fs::read_dir(&app).unwrap().count(), 0);

        let mut perms = std::fs::metadata(&app).unwrap().permissions();
        perms.set_readonly(true);
        std::fs::set_permissions(&app, perms).unwrap();

        assert!(!fs.is_writable(&app));
        assert_eq!(std::fs::read_dir(&app).unwrap().count(), 0);

        fs.make_writable(&app).unwrap();
    }
}
