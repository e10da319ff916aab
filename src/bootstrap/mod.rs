//! # Container Bootstrap
//!
//! The host assembles a [`BootstrapContext`] describing who to impersonate and
//! what to run, and hands it to `drun-bootstrap run --context <blob>` as the
//! container's command. Inside the container the context is turned into a
//! short, fixed list of [`Instruction`]s by [`plan`] and executed by the
//! [`Interpreter`]:
//!
//! 1. enter the working directory
//! 2. create the impersonated user's home
//! 3. recreate a group and user matching the host uid/gid
//! 4. grant passwordless sudo
//! 5. resolve the environment (persisted snapshot, overrides, `HOME`)
//! 6. drop privileges, group first
//! 7. install terminal capabilities (best effort)
//! 8. exec a shell running the composed user command
//!
//! Every step tolerates being repeated in a fresh container from the same
//! image. System effects go through [`SystemOps`] and external programs through
//! [`CommandRunner`](crate::process::CommandRunner), so the whole sequence runs
//! in tests without a container.

use std::path::PathBuf;

pub mod context;
pub mod env_store;
pub mod interpreter;
pub mod plan;

pub use context::{BootstrapContext, PROTOCOL_VERSION, TerminfoBlob, UserIdentity};
pub use env_store::{dump_env, load_env, rewrite_sudoers, sudo_grant};
pub use interpreter::{Interpreter, LinuxSystem, SystemOps};
pub use plan::{Instruction, compose_script, plan};

/// Errors raised inside the container.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Context blob is not valid base64
    #[error("failed to decode bootstrap context: {0}")]
    Decode(#[from] base64::DecodeError),

    /// Context or environment JSON is malformed
    #[error("failed to parse bootstrap data: {0}")]
    Json(#[from] serde_json::Error),

    /// Host and container disagree on the protocol
    #[error("bootstrap protocol mismatch (expected {expected}, got {found})")]
    ProtocolMismatch { expected: u32, found: u32 },

    /// Filesystem error on a specific path
    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A credential change was refused
    #[error("failed to {step}: {source}")]
    Privileges {
        step: &'static str,
        #[source]
        source: nix::errno::Errno,
    },

    /// Neither shell exists in the image
    #[error("no shell available (tried {preferred} and {fallback})")]
    NoShell {
        preferred: &'static str,
        fallback: &'static str,
    },

    #[error(transparent)]
    Process(#[from] crate::process::ProcessError),
}

/// Result type for bootstrap operations.
pub type Result<T> = std::result::Result<T, BootstrapError>;

pub(crate) fn io_error(
    path: impl Into<PathBuf>,
) -> impl FnOnce(std::io::Error) -> BootstrapError {
    let path = path.into();
    move |source| BootstrapError::Io { path, source }
}
