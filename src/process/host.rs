//! Native host command execution.
//!
//! Runs commands directly on the host system using `tokio::process::Command`.

use super::{CommandRunner, ProcessCommand, ProcessError, ProcessOutput, StdioMode};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Runs commands on the local system
#[derive(Debug, Clone, Default)]
pub struct HostRunner;

impl HostRunner {
    /// Create a new host runner
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for HostRunner {
    async fn run(&self, cmd: ProcessCommand) -> Result<ProcessOutput, ProcessError> {
        debug!("Running command on host: {}", cmd.display());

        let mut command = Command::new(&cmd.program);
        command.args(&cmd.args).envs(&cmd.env);

        if let Some(ref dir) = cmd.working_dir {
            command.current_dir(dir);
        }

        let spawn_error = |source| ProcessError::Spawn {
            program: cmd.program.clone(),
            source,
        };

        let (exit_code, stdout, stderr) = match cmd.stdio {
            StdioMode::Capture => {
                let output = command
                    .stdin(Stdio::null())
                    .output()
                    .await
                    .map_err(spawn_error)?;
                (output.status.code(), output.stdout, output.stderr)
            }
            StdioMode::Inherit => {
                let status = command.status().await.map_err(spawn_error)?;
                (status.code(), Vec::new(), Vec::new())
            }
        };

        Ok(ProcessOutput {
            exit_code: exit_code.unwrap_or(-1),
            stdout,
            stderr,
        })
    }
}
