//! Zip packing and unpacking of staging directories
//!
//! Packing walks the source tree self-first (a directory entry precedes its
//! contents), stores paths relative to the source with `/` separators, and
//! writes to `<dest>.part` before renaming into place so a half-written
//! archive is never visible under its final name.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ArchiveError;
use crate::path::to_forward_slashes;

/// Zip support is compiled in; kept as a probe for the status report
pub const fn is_available() -> bool {
    true
}

/// What ended up in an archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackSummary {
    pub directories: usize,
    pub files: usize,
    pub bytes: u64,
}

/// What came out of an archive
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackSummary {
    pub directories: usize,
    pub files: usize,
    /// Entries skipped because their names escape the destination
    pub skipped: usize,
}

/// Pack `source` (a directory, or a single file) into the zip at `dest`
pub fn pack(source: &Path, dest: &Path) -> Result<PackSummary, ArchiveError> {
    if !is_available() {
        return Err(ArchiveError::CapabilityMissing);
    }
    if !source.exists() {
        return Err(ArchiveError::SourceMissing(source.to_path_buf()));
    }

    let part_path = part_path(dest);
    let file =
        File::create(&part_path).map_err(|_| ArchiveError::DestUnwritable(dest.to_path_buf()))?;

    let result = write_archive(source, BufWriter::new(file));

    match result {
        Ok(summary) => {
            fs::rename(&part_path, dest).map_err(|e| {
                let _ = fs::remove_file(&part_path);
                warn!("Failed to move {} into place: {}", part_path.display(), e);
                ArchiveError::DestUnwritable(dest.to_path_buf())
            })?;
            debug!(
                "Packed {} dirs, {} files ({} bytes) into {}",
                summary.directories,
                summary.files,
                summary.bytes,
                dest.display()
            );
            Ok(summary)
        }
        Err(e) => {
            let _ = fs::remove_file(&part_path);
            Err(e)
        }
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn write_archive(
    source: &Path,
    writer: BufWriter<File>,
) -> Result<PackSummary, ArchiveError> {
    let mut zip = ZipWriter::new(writer);
    let mut summary = PackSummary::default();

    if source.is_file() {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        summary.bytes += add_file(&mut zip, source, &name)?;
        summary.files += 1;
    } else {
        let dir_options = FileOptions::default().compression_method(CompressionMethod::Stored);

        for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| ArchiveError::Zip(e.to_string()))?;
            let relative = entry
                .path()
                .strip_prefix(source)
                .map_err(|e| ArchiveError::Zip(e.to_string()))?;
            let name = to_forward_slashes(relative);

            if entry.file_type().is_dir() {
                zip.add_directory(format!("{}/", name), dir_options)?;
                summary.directories += 1;
            } else if entry.path().is_file() {
                summary.bytes += add_file(&mut zip, entry.path(), &name)?;
                summary.files += 1;
            }
        }
    }

    zip.finish()?;
    Ok(summary)
}

fn add_file(
    zip: &mut ZipWriter<BufWriter<File>>,
    path: &Path,
    name: &str,
) -> Result<u64, ArchiveError> {
    let file = File::open(path).map_err(|_| ArchiveError::SourceMissing(path.to_path_buf()))?;
    let size = file.metadata().map(|m| m.len()).unwrap_or(0);
    let options = FileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .large_file(size >= u32::MAX as u64);

    zip.start_file(name, options)?;
    let mut reader = BufReader::new(file);
    io::copy(&mut reader, zip).map_err(|e| ArchiveError::Zip(e.to_string()))
}

/// Extract every entry of `archive` under `dest`, creating `dest` if needed.
///
/// Entries whose names would land outside `dest` are skipped.
pub fn unpack(archive: &Path, dest: &Path) -> Result<UnpackSummary, ArchiveError> {
    if !is_available() {
        return Err(ArchiveError::CapabilityMissing);
    }
    if !archive.is_file() {
        return Err(ArchiveError::SourceMissing(archive.to_path_buf()));
    }

    let file = File::open(archive).map_err(|_| ArchiveError::SourceMissing(archive.to_path_buf()))?;
    let mut zip = ZipArchive::new(BufReader::new(file))
        .map_err(|_| ArchiveError::SourceMissing(archive.to_path_buf()))?;

    fs::create_dir_all(dest).map_err(|_| ArchiveError::DestUnwritable(dest.to_path_buf()))?;

    let mut summary = UnpackSummary::default();

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let outpath = match entry.enclosed_name() {
            Some(path) => dest.join(path),
            None => {
                warn!("Skipping archive entry outside destination: {}", entry.name());
                summary.skipped += 1;
                continue;
            }
        };

        if entry.is_dir() {
            fs::create_dir_all(&outpath)
                .map_err(|_| ArchiveError::DestUnwritable(outpath.clone()))?;
            summary.directories += 1;
            continue;
        }

        if let Some(parent) = outpath.parent() {
            fs::create_dir_all(parent)
                .map_err(|_| ArchiveError::DestUnwritable(parent.to_path_buf()))?;
        }
        let mut out =
            File::create(&outpath).map_err(|_| ArchiveError::DestUnwritable(outpath.clone()))?;
        io::copy(&mut entry, &mut out).map_err(|e| ArchiveError::Zip(e.to_string()))?;
        summary.files += 1;
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::io::{Read, Write};
    use tempfile::TempDir;

    fn sample_tree(root: &Path) -> PathBuf {
        let src = root.join("staging");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("a.txt"), "x").unwrap();
        fs::write(src.join("sub").join("b.txt"), "y").unwrap();
        src
    }

    fn entries(archive: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut zip = ZipArchive::new(File::open(archive).unwrap()).unwrap();
        let mut map = BTreeMap::new();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).unwrap();
            let mut buf = Vec::new();
            entry.read_to_end(&mut buf).unwrap();
            map.insert(entry.name().to_string(), buf);
        }
        map
    }

    #[test]
    fn test_pack_unpack_roundtrip() {
        let dir = TempDir::new().unwrap();
        let src = sample_tree(dir.path());
        let zip_path = dir.path().join("2024-01-15_120000.zip");

        let packed = pack(&src, &zip_path).unwrap();
        assert_eq!(packed.files, 2);
        assert_eq!(packed.directories, 1);

        let out = dir.path().join("restored");
        let unpacked = unpack(&zip_path, &out).unwrap();
        assert_eq!(unpacked.files, 2);

        assert_eq!(fs::read_to_string(out.join("a.txt")).unwrap(), "x");
        assert_eq!(
            fs::read_to_string(out.join("sub").join("b.txt")).unwrap(),
            "y"
        );
    }

    #[test]
    fn test_entry_names_use_forward_slashes_and_self_first_order() {
        let dir = TempDir::new().unwrap();
        let src = sample_tree(dir.path());
        let zip_path = dir.path().join("out.zip");
        pack(&src, &zip_path).unwrap();

        let zip = ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let names: Vec<&str> = zip.file_names().collect();
        assert!(names.contains(&"sub/"));
        assert!(names.contains(&"sub/b.txt"));

        let mut zip = ZipArchive::new(File::open(&zip_path).unwrap()).unwrap();
        let ordered: Vec<String> = (0..zip.len())
            .map(|i| zip.by_index(i).unwrap().name().to_string())
            .collect();
        let dir_pos = ordered.iter().position(|n| n == "sub/").unwrap();
        let file_pos = ordered.iter().position(|n| n == "sub/b.txt").unwrap();
        assert!(dir_pos < file_pos);
    }

    #[test]
    fn test_pack_is_repeatable() {
        let dir = TempDir::new().unwrap();
        let src = sample_tree(dir.path());
        let first = dir.path().join("first.zip");
        let second = dir.path().join("second.zip");

        pack(&src, &first).unwrap();
        pack(&src, &second).unwrap();

        assert_eq!(entries(&first), entries(&second));
    }

    #[test]
    fn test_empty_directory_survives() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("staging");
        fs::create_dir_all(src.join("empty")).unwrap();
        let zip_path = dir.path().join("out.zip");

        pack(&src, &zip_path).unwrap();
        let out = dir.path().join("restored");
        unpack(&zip_path, &out).unwrap();

        assert!(out.join("empty").is_dir());
    }

    #[test]
    fn test_pack_missing_source() {
        let dir = TempDir::new().unwrap();
        let result = pack(&dir.path().join("nope"), &dir.path().join("out.zip"));
        assert!(matches!(result, Err(ArchiveError::SourceMissing(_))));
    }

    #[test]
    fn test_pack_unwritable_destination() {
        let dir = TempDir::new().unwrap();
        let src = sample_tree(dir.path());
        let dest = dir.path().join("no-such-dir").join("out.zip");
        let result = pack(&src, &dest);
        assert!(matches!(result, Err(ArchiveError::DestUnwritable(_))));
        assert!(!dest.exists());
    }

    #[test]
    fn test_pack_leaves_no_part_file() {
        let dir = TempDir::new().unwrap();
        let src = sample_tree(dir.path());
        let dest = dir.path().join("out.zip");
        pack(&src, &dest).unwrap();
        assert!(!dir.path().join("out.zip.part").exists());
    }

    #[test]
    fn test_pack_single_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("single.txt");
        fs::write(&file, "only").unwrap();
        let dest = dir.path().join("out.zip");

        pack(&file, &dest).unwrap();

        let map = entries(&dest);
        assert_eq!(map.get("single.txt").map(Vec::as_slice), Some(&b"only"[..]));
    }

    #[test]
    fn test_unpack_missing_archive() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out");
        let result = unpack(&dir.path().join("missing.zip"), &out);
        assert!(matches!(result, Err(ArchiveError::SourceMissing(_))));
        assert!(!out.exists());
    }

    #[test]
    fn test_unpack_garbage_archive() {
        let dir = TempDir::new().unwrap();
        let bogus = dir.path().join("bogus.zip");
        fs::write(&bogus, b"not a zip at all").unwrap();
        let result = unpack(&bogus, &dir.path().join("out"));
        assert!(matches!(result, Err(ArchiveError::SourceMissing(_))));
    }

    #[test]
    fn test_unpack_skips_escaping_entries() {
        let dir = TempDir::new().unwrap();
        let zip_path = dir.path().join("evil.zip");
        {
            let mut zip = ZipWriter::new(File::create(&zip_path).unwrap());
            zip.start_file("../evil.txt", FileOptions::default()).unwrap();
            zip.write_all(b"pwned").unwrap();
            zip.start_file("ok.txt", FileOptions::default()).unwrap();
            zip.write_all(b"fine").unwrap();
            zip.finish().unwrap();
        }

        let out = dir.path().join("nested").join("out");
        let summary = unpack(&zip_path, &out).unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.files, 1);
        assert!(!dir.path().join("nested").join("evil.txt").exists());
        assert_eq!(fs::read_to_string(out.join("ok.txt")).unwrap(), "fine");
    }
}
