//! Typed view of the final parameter set.

use super::{ConfigError, ParamSet, Result, normalize_uuid};
use crate::env::container::DEFAULT_RUNTIME;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Recognized directive names
pub mod directives {
    pub const DOCKER_CONTAINER: &str = "docker_container";
    pub const UUID: &str = "uuid";
    pub const VERSION_BY_BUILD_CONTEXT: &str = "version_by_build_context";
    pub const EXTRA_ARGS: &str = "extra_args";
    pub const PRELAUNCH_HOOK: &str = "prelaunch_hook";
    pub const MOUNT_TO: &str = "mount_to";
    pub const CD_TO: &str = "cd_to";
    pub const EXTRA_HOSTS: &str = "extra_hosts";
    pub const EXTRA_SHARES: &str = "extra_shares";
    pub const SHARE_GIT_DIR: &str = "share_git_dir";
    pub const PERSIST_ENVIRONMENT: &str = "persist_environment";
    pub const ENV_OVERRIDES: &str = "env_overrides";
    pub const EXTRA_SHELL: &str = "extra_shell";
    pub const PREFIX_CMD: &str = "prefix_cmd";
    pub const PREFIX_CMD_QUIET: &str = "prefix_cmd_quiet";
    pub const CONTAINER_RUNTIME: &str = "container_runtime";
    pub const BOOTSTRAP_BINARY: &str = "bootstrap_binary";
}

/// Command run in the container before the user command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "argv", rename_all = "snake_case")]
pub enum PrefixCommand {
    /// Output is shown
    Verbose(Vec<String>),
    /// Output is discarded
    Quiet(Vec<String>),
}

/// Validated launcher configuration.
///
/// Relative paths are kept as written; they are resolved against the build
/// root by the command assembler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Image name without fingerprint tag
    pub image: String,
    /// Normalized instance UUID
    pub uuid: Option<String>,
    /// Fingerprint cache file; `Some` enables content versioning
    pub context_cache: Option<PathBuf>,
    pub extra_args: Vec<String>,
    pub prelaunch_hook: Option<Vec<String>>,
    pub mount_to: Option<PathBuf>,
    pub cd_to: Option<PathBuf>,
    pub extra_hosts: Vec<String>,
    pub extra_shares: Vec<String>,
    pub share_git_dir: bool,
    pub persist_environment: Option<PathBuf>,
    /// Host variables forwarded into the container
    pub env_overrides: Vec<String>,
    pub extra_shell: Option<PathBuf>,
    pub prefix: Option<PrefixCommand>,
    /// Container runtime executable
    pub runtime: String,
    /// Host bootstrap binary to bind-mount, as a path or PATH name
    pub bootstrap_binary: Option<String>,
}

impl Settings {
    /// Validate `params` and build the typed record.
    ///
    /// # Errors
    ///
    /// Fails when `docker_container` is missing, when both prefix directives
    /// are present, or when a single-valued directive has the wrong arity.
    pub fn from_params(params: &ParamSet, config_path: &Path) -> Result<Self> {
        let image = params
            .get(directives::DOCKER_CONTAINER)
            .and_then(|values| values.first())
            .cloned()
            .ok_or_else(|| ConfigError::MissingDirective {
                directive: directives::DOCKER_CONTAINER,
                path: config_path.to_path_buf(),
            })?;

        let prefix = match (
            params.get(directives::PREFIX_CMD),
            params.get(directives::PREFIX_CMD_QUIET),
        ) {
            (Some(_), Some(_)) => {
                return Err(ConfigError::Conflict {
                    first: directives::PREFIX_CMD,
                    second: directives::PREFIX_CMD_QUIET,
                });
            }
            (Some(cmd), None) => non_empty(cmd).map(PrefixCommand::Verbose),
            (None, Some(cmd)) => non_empty(cmd).map(PrefixCommand::Quiet),
            (None, None) => None,
        };

        Ok(Self {
            image,
            uuid: first(params, directives::UUID)
                .map(|raw| normalize_uuid(&raw))
                .filter(|u| !u.is_empty()),
            context_cache: single_path(params, directives::VERSION_BY_BUILD_CONTEXT)?,
            extra_args: list(params, directives::EXTRA_ARGS),
            prelaunch_hook: params
                .get(directives::PRELAUNCH_HOOK)
                .and_then(|cmd| non_empty(cmd)),
            mount_to: single_path(params, directives::MOUNT_TO)?,
            cd_to: single_path(params, directives::CD_TO)?,
            extra_hosts: list(params, directives::EXTRA_HOSTS),
            extra_shares: list(params, directives::EXTRA_SHARES),
            share_git_dir: params.contains_key(directives::SHARE_GIT_DIR),
            persist_environment: single_path(params, directives::PERSIST_ENVIRONMENT)?,
            env_overrides: list(params, directives::ENV_OVERRIDES),
            extra_shell: single_path(params, directives::EXTRA_SHELL)?,
            prefix,
            runtime: first(params, directives::CONTAINER_RUNTIME)
                .unwrap_or_else(|| DEFAULT_RUNTIME.to_string()),
            bootstrap_binary: first(params, directives::BOOTSTRAP_BINARY),
        })
    }
}

fn first(params: &ParamSet, key: &str) -> Option<String> {
    params.get(key).and_then(|values| values.first()).cloned()
}

fn list(params: &ParamSet, key: &str) -> Vec<String> {
    params.get(key).cloned().unwrap_or_default()
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    if values.is_empty() {
        None
    } else {
        Some(values.to_vec())
    }
}

fn single_path(params: &ParamSet, key: &'static str) -> Result<Option<PathBuf>> {
    match params.get(key) {
        None => Ok(None),
        Some(values) if values.len() == 1 => Ok(Some(PathBuf::from(&values[0]))),
        Some(values) => Err(ConfigError::Arity {
            directive: key,
            expected: "exactly 1",
            found: values.len(),
        }),
    }
}
