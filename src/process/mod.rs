//! # External Process Layer
//!
//! Every external program drun talks to (the prelaunch hook, the image
//! rebuild, `infocmp`, `git`, `useradd`, `tic`, ...) goes through the
//! [`CommandRunner`] trait, so the launcher and the bootstrap interpreter can
//! be exercised against a recording fake instead of a real system.
//!
//! Replacing the current process image is never done here. Both binaries
//! compute an [`Outcome`] and only their `main` performs the final
//! [`exec_replace`].
//!
//! ## Components
//!
//! - **[`ProcessCommand`]**: program, arguments, working directory, environment
//! - **[`ProcessOutput`]**: exit code plus captured output
//! - **[`HostRunner`]**: `tokio::process` implementation
//! - **[`ExecRequest`]** / **[`Outcome`]**: terminal result of a pipeline

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Host command runner built on `tokio::process`.
pub mod host;

pub use host::HostRunner;

/// Result of running a child process to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code (-1 when terminated by a signal)
    pub exit_code: i32,
    /// Captured standard output (empty when inherited)
    pub stdout: Vec<u8>,
    /// Captured standard error (empty when inherited)
    pub stderr: Vec<u8>,
}

impl ProcessOutput {
    /// Check if the process exited successfully
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Standard output as trimmed text
    pub fn stdout_text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).trim().to_string()
    }
}

/// How a child's standard streams are wired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StdioMode {
    /// Capture stdout and stderr
    #[default]
    Capture,
    /// Share the parent's terminal
    Inherit,
}

/// Command to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessCommand {
    /// Program name or path
    pub program: String,
    /// Command line arguments
    pub args: Vec<String>,
    /// Working directory
    pub working_dir: Option<PathBuf>,
    /// Environment variables to add
    pub env: BTreeMap<String, String>,
    /// Stream wiring
    pub stdio: StdioMode,
}

impl ProcessCommand {
    /// Create a new command with program and args
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
            env: BTreeMap::new(),
            stdio: StdioMode::Capture,
        }
    }

    /// Build a command from an argv list. Returns `None` for an empty list.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone(), args.iter().cloned()))
    }

    /// Set the working directory
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add environment variables
    pub fn with_envs<I, K, V>(mut self, envs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in envs {
            self.env.insert(key.into(), value.into());
        }
        self
    }

    /// Share the parent's terminal instead of capturing output
    pub fn inherit_stdio(mut self) -> Self {
        self.stdio = StdioMode::Inherit;
        self
    }

    /// Render as a single display line
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Errors while launching a child process
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    /// The program could not be started
    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Runs external commands to completion.
///
/// Each command is attempted exactly once and no timeout is applied.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command and wait for it to exit
    ///
    /// # Errors
    ///
    /// Returns an error only when the program cannot be started. A non-zero
    /// exit is reported through [`ProcessOutput::exit_code`].
    async fn run(&self, cmd: ProcessCommand) -> Result<ProcessOutput, ProcessError>;
}

/// A request to replace the current process image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Program resolved through `PATH` when not absolute
    pub program: String,
    /// Arguments, excluding argv[0]
    pub args: Vec<String>,
    /// Full environment for the new image; `None` keeps the current one
    pub env: Option<BTreeMap<String, String>>,
}

/// Terminal result of a launcher or bootstrap pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Replace the current process
    Exec(ExecRequest),
    /// Exit with the given status
    Exit(i32),
}

/// Replace the current process image. Only returns on failure.
pub fn exec_replace(request: &ExecRequest) -> std::io::Error {
    use std::os::unix::process::CommandExt;

    let mut command = std::process::Command::new(&request.program);
    command.args(&request.args);
    if let Some(env) = &request.env {
        command.env_clear().envs(env);
    }
    command.exec()
}
