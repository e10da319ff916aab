//! Command line of the in-container `drun-bootstrap` binary.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "drun-bootstrap")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Impersonate the host user inside a drun container and run its command")]
pub struct BootstrapArgs {
    #[command(subcommand)]
    pub command: BootstrapCommand,
}

#[derive(Debug, Subcommand)]
pub enum BootstrapCommand {
    /// Set up the user and exec the composed shell command
    Run {
        /// Base64 bootstrap context produced by `drun`
        #[arg(long = "context", value_name = "BLOB")]
        context: String,
    },
    /// Save the current environment for a later session
    DumpEnv {
        /// Snapshot file
        path: PathBuf,
    },
}
