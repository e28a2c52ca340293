//! External runner process wrapper -- spawn with stdout and stderr on one pipe, wait.

use super::Browser;
use crate::config::RunnerConfig;
use std::ffi::OsString;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

/// Everything needed to run one test file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub test_file: PathBuf,
    pub browser: Browser,
    pub log_file: PathBuf,
}

impl Invocation {
    /// Runner arguments: `--variable BROWSER:<browser> --log <log file> <test file>`.
    pub fn args(&self) -> Vec<OsString> {
        vec![
            OsString::from("--variable"),
            OsString::from(format!("BROWSER:{}", self.browser)),
            OsString::from("--log"),
            self.log_file.clone().into_os_string(),
            self.test_file.clone().into_os_string(),
        ]
    }
}

/// Why a runner could not be run to completion.
///
/// The `Display` text is what gets shown in place of the runner's output.
#[derive(Debug, Error)]
pub enum LaunchFault {
    #[error("failed to create output pipe for `{program}`: {source}")]
    Pipe {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed waiting for `{program}`: {source}")]
    Wait {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to create log directory {}: {source}", .path.display())]
    LogDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A runner that started and exited.
#[derive(Debug)]
pub struct Execution {
    /// `None` when the process was killed by a signal.
    pub exit_code: Option<i32>,
    pub output: CapturedOutput,
    pub elapsed: Duration,
}

/// Launch step of the orchestrator. Implementations block until the runner exits.
pub trait Launcher: Send + Sync {
    fn launch(&self, invocation: &Invocation) -> Result<Execution, LaunchFault>;
}

/// Merged stdout/stderr lines, bounded in memory.
///
/// Lines past the bound still count towards [`CapturedOutput::line_count`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    lines: Vec<String>,
    total: usize,
    limit: usize,
}

impl CapturedOutput {
    pub fn new(limit: usize) -> Self {
        Self {
            lines: Vec::new(),
            total: 0,
            limit,
        }
    }

    pub fn push(&mut self, line: String) {
        self.total += 1;
        if self.lines.len() < self.limit {
            self.lines.push(line);
        }
    }

    /// Every line the process produced, kept or not.
    pub fn line_count(&self) -> usize {
        self.total
    }

    pub fn dropped(&self) -> usize {
        self.total - self.lines.len()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn into_text(self) -> String {
        let dropped = self.dropped();
        let mut text = self.lines.join("\n");
        if dropped > 0 {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(&format!("[{dropped} more lines not captured]"));
        }
        text
    }
}

/// Runs the configured runner binary as a child process.
pub struct ProcessLauncher {
    program: String,
    max_captured_lines: usize,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<String>, max_captured_lines: usize) -> Self {
        Self {
            program: program.into(),
            max_captured_lines,
        }
    }

    pub fn from_config(config: &RunnerConfig) -> Self {
        Self::new(config.program.clone(), config.max_captured_lines)
    }
}

impl Launcher for ProcessLauncher {
    fn launch(&self, invocation: &Invocation) -> Result<Execution, LaunchFault> {
        debug!(program = %self.program, file = %invocation.test_file.display(), "spawning runner");
        let pipe_fault = |source| LaunchFault::Pipe {
            program: self.program.clone(),
            source,
        };

        // Both streams share one pipe so lines arrive in the order they were written.
        let (reader, writer) = os_pipe::pipe().map_err(pipe_fault)?;
        let writer_err = writer.try_clone().map_err(pipe_fault)?;

        let started = Instant::now();
        let mut child = {
            // The command owns the write ends; it must be dropped before reading or
            // the pipe never reaches EOF.
            let mut command = Command::new(&self.program);
            command
                .args(invocation.args())
                .stdin(Stdio::null())
                .stdout(writer)
                .stderr(writer_err);
            command.spawn().map_err(|source| LaunchFault::Spawn {
                program: self.program.clone(),
                source,
            })?
        };

        let mut output = CapturedOutput::new(self.max_captured_lines);
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) => break,
                Ok(_) => {
                    let line = String::from_utf8_lossy(&buf);
                    output.push(line.trim_end_matches(['\n', '\r']).to_string());
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!(program = %self.program, error = %e, "runner output read failed");
                    break;
                }
            }
        }

        let status = child.wait().map_err(|source| LaunchFault::Wait {
            program: self.program.clone(),
            source,
        })?;

        Ok(Execution {
            exit_code: status.code(),
            output,
            elapsed: started.elapsed(),
        })
    }
}

/// Create `dir` if needed and pick a log path that does not exist yet.
pub(crate) fn reserve_log_path(dir: &Path, stem: &str, stamp: &str) -> Result<PathBuf, LaunchFault> {
    std::fs::create_dir_all(dir).map_err(|source| LaunchFault::LogDir {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut candidate = dir.join(format!("{stem}_{stamp}.html"));
    let mut n = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{stem}_{stamp}_{n}.html"));
        n += 1;
    }
    Ok(candidate)
}
