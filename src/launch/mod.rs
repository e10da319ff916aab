//! Host side of a launch: gathering host state and assembling the container
//! runtime invocation that starts the bootstrap.

use std::path::PathBuf;

pub mod assembler;
pub mod host;
pub mod hostname;
pub mod mounts;

pub use assembler::{AssembledCommand, CommandAssembler, LaunchRequest};
pub use host::{HostContext, resolve_username};
pub use hostname::derive_hostname;
pub use mounts::Mount;

/// Errors while assembling the runtime invocation.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// Assembled argument vector exceeds the exec size limit
    #[error("command is too long for this system ({length} bytes, limit {limit})")]
    CommandTooLong { length: usize, limit: usize },

    /// `infocmp` exited non-zero
    #[error("infocmp {term} failed (exit {code})")]
    Terminfo { term: String, code: i32 },

    /// `bootstrap_binary` names a program that is not on PATH
    #[error("failed to locate {name} on PATH: {source}")]
    BootstrapLookup {
        name: String,
        #[source]
        source: which::Error,
    },

    /// `bootstrap_binary` names a path that is not a file
    #[error("bootstrap binary {} does not exist", path.display())]
    BootstrapMissing { path: PathBuf },

    #[error(transparent)]
    Context(#[from] crate::bootstrap::BootstrapError),

    #[error(transparent)]
    Process(#[from] crate::process::ProcessError),
}

/// Result type for launch operations.
pub type Result<T> = std::result::Result<T, LaunchError>;
