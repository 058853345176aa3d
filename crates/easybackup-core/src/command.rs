//! External command execution
//!
//! Command lines come from operator-editable templates, so they are split
//! into arguments with shell-like quoting rules and spawned directly rather
//! than through `/bin/sh`. Metacharacters such as `;`, `|`, `$()` and
//! backticks are therefore inert. The one shell feature templates rely on,
//! feeding a file to stdin with `< path`, is recognised explicitly.
//!
//! Values substituted into a template must go through [`escape_arg`] first.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// How often a running child is polled when a timeout is configured
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Captured result of running an external command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Process exit code; `None` if it never started, was killed or timed out
    pub exit_code: Option<i32>,
    /// Standard output with trailing whitespace removed
    pub stdout: String,
    /// Standard error with trailing whitespace removed
    pub stderr: String,
    pub timed_out: bool,
}

impl CommandOutput {
    /// Output for a command that could not be started at all
    pub fn not_started(reason: impl Into<String>) -> Self {
        Self {
            exit_code: None,
            stdout: String::new(),
            stderr: reason.into(),
            timed_out: false,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// First line of stdout, if any
    pub fn first_line(&self) -> Option<&str> {
        self.stdout.lines().next().map(str::trim).filter(|l| !l.is_empty())
    }
}

/// Runs command lines. Never fails on a nonzero exit; callers inspect the
/// returned [`CommandOutput`].
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, command_line: &str, workdir: Option<&Path>) -> CommandOutput;
}

/// Spawns real processes
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {
    timeout: Option<Duration>,
}

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self { timeout: None }
    }

    /// Kill children that run longer than `timeout`
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

impl CommandExecutor for SystemCommandRunner {
    fn execute(&self, command_line: &str, workdir: Option<&Path>) -> CommandOutput {
        let invocation = match Invocation::parse(command_line) {
            Ok(invocation) => invocation,
            Err(reason) => return CommandOutput::not_started(reason),
        };

        debug!(program = %invocation.program, args = invocation.args.len(), "Spawning command");

        let mut command = Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        match &invocation.stdin {
            Some(path) => match File::open(path) {
                Ok(file) => {
                    command.stdin(Stdio::from(file));
                }
                Err(e) => {
                    return CommandOutput::not_started(format!(
                        "Cannot open input file '{}': {}",
                        path.display(),
                        e
                    ))
                }
            },
            None => {
                command.stdin(Stdio::null());
            }
        }

        if let Some(dir) = workdir {
            command.current_dir(dir);
        }

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                return CommandOutput::not_started(format!(
                    "Failed to start '{}': {}",
                    invocation.program, e
                ))
            }
        };

        // Drain both pipes concurrently so a chatty child cannot block on a full pipe
        let stdout_reader = child.stdout.take().map(spawn_reader);
        let stderr_reader = child.stderr.take().map(spawn_reader);

        let (status, timed_out) = wait_for(&mut child, self.timeout);

        let stdout = join_reader(stdout_reader);
        let mut stderr = join_reader(stderr_reader);

        if timed_out {
            let limit = self.timeout.map(|t| t.as_secs_f64()).unwrap_or_default();
            warn!(program = %invocation.program, "Command timed out after {:.1}s", limit);
            if !stderr.is_empty() {
                stderr.push('\n');
            }
            stderr.push_str(&format!(
                "Command '{}' timed out after {:.1}s and was killed",
                invocation.program, limit
            ));
        }

        CommandOutput {
            exit_code: if timed_out {
                None
            } else {
                status.and_then(|s| s.code())
            },
            stdout: stdout.trim_end().to_string(),
            stderr: stderr.trim_end().to_string(),
            timed_out,
        }
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<Vec<u8>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        buf
    })
}

fn join_reader(handle: Option<thread::JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn wait_for(child: &mut Child, timeout: Option<Duration>) -> (Option<ExitStatus>, bool) {
    let Some(limit) = timeout else {
        return (child.wait().ok(), false);
    };

    let started = Instant::now();
    loop {
        match child.try_wait() {
            Ok(Some(status)) => return (Some(status), false),
            Ok(None) if started.elapsed() >= limit => {
                let _ = child.kill();
                return (child.wait().ok(), true);
            }
            Ok(None) => thread::sleep(POLL_INTERVAL),
            Err(_) => return (None, false),
        }
    }
}

/// Quote a value as a single shell argument.
///
/// The result is wrapped in single quotes; embedded single quotes become
/// `'\''`. Both [`split_command_line`] and POSIX shells read it back as the
/// original value.
pub fn escape_arg(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// A word of a split command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Word {
    pub value: String,
    /// Any part of the word was quoted or escaped
    pub quoted: bool,
}

/// Split a command line into words.
///
/// Single quotes are literal, double quotes allow `\"`, `\\`, `\$` and `` \` ``
/// escapes, and a backslash outside quotes escapes the next character.
pub fn split_command_line(line: &str) -> Result<Vec<Word>, String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_word = false;
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\'' => {
                in_word = true;
                quoted = true;
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(ch) => current.push(ch),
                        None => return Err("Unterminated single quote in command".to_string()),
                    }
                }
            }
            '"' => {
                in_word = true;
                quoted = true;
                loop {
                    match chars.next() {
                        Some('"') => break,
                        Some('\\') => match chars.peek() {
                            Some(&next) if matches!(next, '"' | '\\' | '$' | '`') => {
                                current.push(next);
                                chars.next();
                            }
                            _ => current.push('\\'),
                        },
                        Some(ch) => current.push(ch),
                        None => return Err("Unterminated double quote in command".to_string()),
                    }
                }
            }
            '\\' => {
                in_word = true;
                quoted = true;
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            c if c.is_whitespace() => {
                if in_word {
                    words.push(Word {
                        value: std::mem::take(&mut current),
                        quoted,
                    });
                    in_word = false;
                    quoted = false;
                }
            }
            c => {
                in_word = true;
                current.push(c);
            }
        }
    }

    if in_word {
        words.push(Word {
            value: current,
            quoted,
        });
    }

    Ok(words)
}

/// A parsed command ready to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
struct Invocation {
    program: String,
    args: Vec<String>,
    stdin: Option<PathBuf>,
}

impl Invocation {
    fn parse(command_line: &str) -> Result<Self, String> {
        let words = split_command_line(command_line)?;
        let mut args = Vec::new();
        let mut stdin = None;
        let mut iter = words.into_iter();

        while let Some(word) = iter.next() {
            if !word.quoted && word.value == "<" {
                let target = iter
                    .next()
                    .ok_or_else(|| "Missing file after '<' in command".to_string())?;
                stdin = Some(PathBuf::from(target.value));
            } else {
                args.push(word.value);
            }
        }

        if args.is_empty() {
            return Err("Empty command".to_string());
        }
        let program = args.remove(0);

        Ok(Self {
            program,
            args,
            stdin,
        })
    }
}
