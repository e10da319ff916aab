//! Crate-level error type and exit status mapping.

use crate::bootstrap::BootstrapError;
use crate::cli::CliError;
use crate::config::ConfigError;
use crate::fingerprint::FingerprintError;
use crate::launch::LaunchError;
use crate::process::ProcessError;

/// Exit status for configuration, usage and size errors
pub const EXIT_FATAL: i32 = 255;

/// Exit status when a hook or rebuild fails
pub const EXIT_STEP_FAILED: i32 = 1;

/// Any error that ends an invocation
#[derive(Debug, thiserror::Error)]
pub enum DrunError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fingerprint(#[from] FingerprintError),

    #[error(transparent)]
    Launch(#[from] LaunchError),

    #[error(transparent)]
    Cli(#[from] CliError),

    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    /// A fingerprint was requested but the configuration does not use one
    #[error("context sha is unused by this configuration")]
    ContextUnused,

    #[error("prelaunch_hook failed (exit {code})")]
    HookFailed { code: i32 },

    #[error("failed to rebuild {image} (exit {code})")]
    RebuildFailed { image: String, code: i32 },

    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),
}

impl DrunError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::HookFailed { .. } | Self::RebuildFailed { .. } => EXIT_STEP_FAILED,
            _ => EXIT_FATAL,
        }
    }
}

/// Result type for whole invocations.
pub type Result<T> = std::result::Result<T, DrunError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(DrunError::HookFailed { code: 3 }.exit_code(), 1);
        assert_eq!(
            DrunError::RebuildFailed {
                image: "i".to_string(),
                code: 1
            }
            .exit_code(),
            1
        );
        assert_eq!(DrunError::ContextUnused.exit_code(), 255);
        assert_eq!(
            DrunError::from(LaunchError::CommandTooLong {
                length: 10,
                limit: 5
            })
            .exit_code(),
            255
        );
    }
}
