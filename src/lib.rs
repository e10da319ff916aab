//! # drun
//!
//! Run a command inside a container as the invoking host user.
//!
//! A project declares its container in a `.drun_root` (or `drun_root`) file at
//! its root. Running `drun make test` anywhere below that directory mounts the
//! project into the container, recreates the invoking user inside it with the
//! same uid and gid, and runs `make test` there, so files written through the
//! mount keep their host ownership.
//!
//! ## Architecture Overview
//!
//! - **[`config`]**: config file discovery, `DRUN_OPT_*` environment overrides
//!   and validation into a typed [`Settings`] record
//! - **[`fingerprint`]**: content hash of the image build context, cached on
//!   disk, used as an implicit image tag
//! - **[`launch`]**: host snapshot and assembly of the container runtime
//!   invocation
//! - **[`bootstrap`]**: the record handed into the container and the
//!   interpreter that impersonates the user and execs the command
//! - **[`process`]**: the seam every external program goes through
//! - **[`app`]**: the launcher pipeline tying the above together
//!
//! Neither binary replaces its process image inside library code. Pipelines
//! return an [`Outcome`] and the binary's `main` performs the exec.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use drun::{HostContext, HostRunner, Launcher, Outcome};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let host = HostContext::capture()?;
//!     let runner = HostRunner::new();
//!     let args = vec!["--drun-print".to_string(), "echo".to_string(), "hi".to_string()];
//!
//!     let outcome = Launcher::new(&host, &runner)
//!         .run(&args, &mut std::io::stdout())
//!         .await?;
//!     assert_eq!(outcome, Outcome::Exit(0));
//!     Ok(())
//! }
//! ```

/// Launcher pipeline.
pub mod app;

/// In-container bootstrap protocol and interpreter.
///
/// Builds the instruction list from a [`BootstrapContext`] and runs it against
/// the container system with privileges dropped before the user shell starts.
pub mod bootstrap;

/// Wrapper flags and bootstrap subcommands.
pub mod cli;

/// Declarative configuration.
///
/// Discovers the config file, applies environment overrides as an explicit
/// ordered list, and validates the result once.
pub mod config;

/// Environment constants and path utilities.
///
/// Centralizes file names, variable prefixes and in-container paths used by
/// both binaries.
pub mod env;

/// Crate-level error and exit status mapping.
pub mod error;

/// Build-context fingerprinting.
pub mod fingerprint;

/// Runtime invocation assembly.
pub mod launch;

/// External process execution.
pub mod process;

pub use app::{Launcher, select_image};
pub use bootstrap::{BootstrapContext, Instruction, Interpreter, LinuxSystem, SystemOps};
pub use config::{ConfigResolver, EnvOverrideResolver, LoadedConfig, ParamSet, Settings};
pub use error::{DrunError, Result};
pub use fingerprint::{ContextFingerprinter, Fingerprint};
pub use launch::{AssembledCommand, CommandAssembler, HostContext, LaunchRequest};
pub use process::{CommandRunner, ExecRequest, HostRunner, Outcome, exec_replace};
