//! Test utilities for easybackup-core
//!
//! [`ScriptedExecutor`] stands in for the subprocess runner and
//! [`RecordingFilesystem`] wraps the real filesystem while recording every
//! call, so tests can assert which paths an operation touched.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::command::{CommandExecutor, CommandOutput};
use crate::fs::{FileEntry, Filesystem, LocalFilesystem};

/// Command executor answering from a script instead of spawning processes.
///
/// Rules are matched in insertion order against the command line; the first
/// rule whose needle is contained in the line wins. Unmatched commands
/// succeed with empty output.
#[derive(Default)]
pub struct ScriptedExecutor {
    rules: Vec<(String, CommandOutput)>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer commands containing `needle` with `output`
    pub fn respond(mut self, needle: impl Into<String>, output: CommandOutput) -> Self {
        self.rules.push((needle.into(), output));
        self
    }

    /// Answer commands containing `needle` with a successful `stdout`
    pub fn respond_stdout(self, needle: impl Into<String>, stdout: impl Into<String>) -> Self {
        self.respond(
            needle,
            CommandOutput {
                exit_code: Some(0),
                stdout: stdout.into(),
                ..Default::default()
            },
        )
    }

    /// Command lines executed so far
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl CommandExecutor for ScriptedExecutor {
    fn execute(&self, command_line: &str, _workdir: Option<&Path>) -> CommandOutput {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command_line.to_string());
        }
        self.rules
            .iter()
            .find(|(needle, _)| command_line.contains(needle.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_else(|| CommandOutput {
                exit_code: Some(0),
                ..Default::default()
            })
    }
}

/// Filesystem spy: delegates to [`LocalFilesystem`] and logs each call as
/// `"<operation> <path>"`
#[derive(Default)]
pub struct RecordingFilesystem {
    inner: LocalFilesystem,
    calls: Mutex<Vec<String>>,
}

impl RecordingFilesystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Paths passed to any call
    pub fn touched_paths(&self) -> Vec<PathBuf> {
        self.calls()
            .iter()
            .filter_map(|c| c.split_once(' ').map(|(_, p)| PathBuf::from(p)))
            .collect()
    }

    fn record(&self, op: &str, path: &Path) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(format!("{} {}", op, path.display()));
        }
    }
}

impl Filesystem for RecordingFilesystem {
    fn exists(&self, path: &Path) -> bool {
        self.record("exists", path);
        self.inner.exists(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.record("is_dir", path);
        self.inner.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        self.record("is_file", path);
        self.inner.is_file(path)
    }

    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.record("create_dir_all", path);
        self.inner.create_dir_all(path)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        self.record("remove", path);
        self.inner.remove(path)
    }

    fn write(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.record("write", path);
        self.inner.write(path, contents)
    }

    fn append(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        self.record("append", path);
        self.inner.append(path, contents)
    }

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        self.record("read", path);
        self.inner.read_to_string(path)
    }

    fn copy_file(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.record("copy", to);
        self.inner.copy_file(from, to)
    }

    fn mirror(&self, from: &Path, to: &Path, skip: Option<&Path>) -> io::Result<()> {
        self.record("mirror", to);
        self.inner.mirror(from, to, skip)
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        self.record("rename", to);
        self.inner.rename(from, to)
    }

    fn list_dir(&self, path: &Path) -> io::Result<Vec<FileEntry>> {
        self.record("list_dir", path);
        self.inner.list_dir(path)
    }

    fn is_readable(&self, path: &Path) -> bool {
        self.record("is_readable", path);
        self.inner.is_readable(path)
    }

    fn is_writable(&self, path: &Path) -> bool {
        self.record("is_writable", path);
        self.inner.is_writable(path)
    }

    fn make_writable(&self, path: &Path) -> io::Result<()> {
        self.record("make_writable", path);
        self.inner.make_writable(path)
    }
}
