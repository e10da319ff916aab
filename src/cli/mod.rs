//! CLI-specific functionality for both binaries
//!
//! This module contains the launcher's `--drun-` flag parsing and the
//! subcommands of the in-container bootstrap.

pub mod args;
pub mod bootstrap;

pub use args::{CliAction, CliError, CliOptions, UserCommand, help_text, parse_invocation};
pub use bootstrap::{BootstrapArgs, BootstrapCommand};
