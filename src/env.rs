//! Environment constants and path utilities for drun.
//!
//! This module centralizes the file names, variable prefixes and in-container
//! paths shared by the host launcher and the bootstrap interpreter.

use std::path::{Path, PathBuf};

/// Config marker file names, checked in this order in each directory
pub const CONFIG_MARKERS: [&str; 2] = [".drun_root", "drun_root"];

/// Prefix shared by every wrapper flag
pub const FLAG_PREFIX: &str = "--drun-";

/// Variable exported into the container with the build root path
pub const BUILD_ROOT_VAR: &str = "DRUN_BUILD_ROOT";

/// Variable holding the log filter for both binaries
pub const LOG_FILTER_VAR: &str = "DRUN_LOG";

/// Default log filter when [`LOG_FILTER_VAR`] is unset
pub const DEFAULT_LOG_FILTER: &str = "drun=warn";

/// Marker printed before each token in print mode
pub const PRINT_MARKER: &str = "++++";

/// Environment-variable override protocol
pub mod overrides {
    /// Replace a directive wholesale
    pub const SET_PREFIX: &str = "DRUN_OPT_SET_";

    /// Append tokens to a directive
    pub const ADD_PREFIX: &str = "DRUN_OPT_ADD_";

    /// Remove a directive
    pub const DEL_PREFIX: &str = "DRUN_OPT_DEL_";

    /// Marker introducing a UUID scope after the operation prefix
    pub const UUID_SCOPE: &str = "UUID_";
}

/// Build-context fingerprinting inputs
pub mod context {
    /// Ignore file listing the re-included build context
    pub const IGNORE_FILE: &str = ".dockerignore";

    /// Image definition file, always part of the context
    pub const IMAGE_DEFINITION: &str = "Dockerfile";

    /// Bytes read per chunk while hashing a tracked file
    pub const HASH_CHUNK_SIZE: usize = 1 << 20;
}

/// Paths and names used inside the container
pub mod container {
    /// Default container runtime executable
    pub const DEFAULT_RUNTIME: &str = "docker";

    /// Where the bootstrap interpreter lives inside the image
    pub const BOOTSTRAP_PATH: &str = "/usr/local/bin/drun-bootstrap";

    /// Host-side binary name of the bootstrap interpreter
    pub const BOOTSTRAP_BINARY_NAME: &str = "drun-bootstrap";

    /// Privilege-policy store rewritten by the bootstrap
    pub const SUDOERS_PATH: &str = "/etc/sudoers";

    /// Preferred shell for the user command
    pub const PREFERRED_SHELL: &str = "/bin/bash";

    /// Minimal shell used when the preferred one is missing
    pub const FALLBACK_SHELL: &str = "/bin/sh";

    /// Shell nesting counter excluded from the persisted environment
    pub const SHELL_DEPTH_VAR: &str = "SHLVL";

    /// Variable status of the user command is captured in
    pub const STATUS_VAR: &str = "drrc";

    /// Root of the impersonated user's temporary homes
    pub const HOME_BASE_PREFIX: &str = "/tmp/drun-home-";

    /// Hostname length limit
    pub const MAX_HOSTNAME_LEN: usize = 63;
}

/// Build the base directory holding the impersonated user's home
pub fn home_base_path(user: &str) -> PathBuf {
    PathBuf::from(format!("{}{}", container::HOME_BASE_PREFIX, user))
}

/// Build the impersonated user's home directory path
pub fn home_path(user: &str) -> PathBuf {
    home_base_path(user).join(user)
}

/// Build the terminfo source file path written inside a home directory
pub fn terminfo_source_path(home: &Path) -> PathBuf {
    home.join("terminfo")
}

/// Build the compiled terminfo database directory inside a home directory
pub fn terminfo_dir_path(home: &Path) -> PathBuf {
    home.join(".terminfo")
}
