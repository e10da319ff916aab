//! Container runtime invocation assembly.

use super::host::HostContext;
use super::hostname::derive_hostname;
use super::mounts::{Mount, absolutize, external_git_dir, share_mounts};
use super::{LaunchError, Result};
use crate::bootstrap::{BootstrapContext, PROTOCOL_VERSION, TerminfoBlob, UserIdentity};
use crate::config::Settings;
use crate::env::container::{BOOTSTRAP_PATH, BOOTSTRAP_BINARY_NAME};
use crate::env::{BUILD_ROOT_VAR, PRINT_MARKER, home_path};
use crate::process::{CommandRunner, ExecRequest, ProcessCommand};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Per-invocation inputs that do not come from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Build root (directory of the config file)
    pub root: PathBuf,
    /// Final image reference, fingerprint tag included
    pub image: String,
    /// Runtime arguments from `--drun-extra-args`
    pub wrapper_args: Vec<String>,
    /// Runtime arguments given before `--`
    pub runtime_args: Vec<String>,
    /// User command tokens
    pub command: Vec<String>,
}

/// A complete runtime invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledCommand {
    /// Runtime executable
    pub program: String,
    pub args: Vec<String>,
    /// Record embedded in `args` for the bootstrap
    pub context: BootstrapContext,
}

impl AssembledCommand {
    /// Program followed by every argument
    pub fn tokens(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str))
    }

    /// Bytes the argument vector occupies when passed to exec, counting one
    /// terminator per token.
    pub fn serialized_len(&self) -> usize {
        self.tokens().map(|token| token.len() + 1).sum()
    }

    /// Fail when the invocation would not fit in `limit` bytes.
    pub fn check_length(&self, limit: Option<usize>) -> Result<()> {
        let length = self.serialized_len();
        match limit {
            Some(limit) if length > limit => Err(LaunchError::CommandTooLong { length, limit }),
            _ => Ok(()),
        }
    }

    /// Write one marked line per token.
    pub fn write_print(&self, out: &mut dyn Write) -> std::io::Result<()> {
        for token in self.tokens() {
            writeln!(out, "{} {}", PRINT_MARKER, token)?;
        }
        Ok(())
    }

    /// Request to replace the current process with the runtime.
    pub fn into_exec(self) -> ExecRequest {
        ExecRequest {
            program: self.program,
            args: self.args,
            env: None,
        }
    }
}

/// Builds the runtime invocation from settings and host state.
pub struct CommandAssembler<'a, R: ?Sized> {
    host: &'a HostContext,
    settings: &'a Settings,
    runner: &'a R,
}

impl<'a, R> CommandAssembler<'a, R>
where
    R: CommandRunner + ?Sized,
{
    pub fn new(host: &'a HostContext, settings: &'a Settings, runner: &'a R) -> Self {
        Self {
            host,
            settings,
            runner,
        }
    }

    /// Assemble the full invocation, bootstrap context included.
    ///
    /// # Errors
    ///
    /// Fails when terminal capabilities cannot be captured, when the
    /// configured bootstrap binary cannot be found, or when the context
    /// cannot be encoded. The length limit is checked separately with
    /// [`AssembledCommand::check_length`].
    pub async fn assemble(&self, request: LaunchRequest) -> Result<AssembledCommand> {
        let settings = self.settings;
        let root = request.root.as_path();

        let mut env_overrides = BTreeMap::new();
        env_overrides.insert(BUILD_ROOT_VAR.to_string(), root.to_string_lossy().into_owned());

        let terminfo = match self.host.var("TERM").filter(|_| self.host.tty) {
            Some(term) => {
                env_overrides.insert("TERM".to_string(), term.to_string());
                Some(self.capture_terminfo(term).await?)
            }
            None => None,
        };

        for key in &settings.env_overrides {
            if let Some(value) = self.host.var(key) {
                env_overrides.insert(key.clone(), value.to_string());
            }
        }

        let mount_target = settings
            .mount_to
            .clone()
            .unwrap_or_else(|| root.to_path_buf());
        let root_mount = Mount {
            source: root.to_path_buf(),
            target: mount_target.to_string_lossy().into_owned(),
            read_only: false,
        };

        let mut shares = share_mounts(&settings.extra_shares, root, &self.host.env);
        if settings.share_git_dir
            && let Some(git_dir) = external_git_dir(self.runner, root).await
        {
            shares.push(Mount::same_path(git_dir));
        }

        let extra_shell = settings
            .extra_shell
            .as_ref()
            .map(|path| absolutize(path, root));
        let bootstrap_mount = self.bootstrap_mount(root)?;

        let context = BootstrapContext {
            protocol_version: PROTOCOL_VERSION,
            workdir: self.container_workdir(root),
            root_dir: root.to_path_buf(),
            user: UserIdentity {
                name: self.host.username.clone(),
                uid: self.host.uid,
                gid: self.host.gid,
                home: home_path(&self.host.username),
            },
            env_overrides,
            command: request.command.clone(),
            terminfo,
            persist_environment: settings
                .persist_environment
                .as_ref()
                .map(|path| resolve_real_path(path, root)),
            extra_shell: extra_shell.clone(),
            prefix: settings.prefix.clone(),
        };

        let mut args: Vec<String> = ["run", "-i", "--rm", "--init", "-v"]
            .into_iter()
            .map(String::from)
            .collect();
        args.push(root_mount.to_arg());
        if self.host.tty {
            args.push("-t".to_string());
        }
        args.push("--privileged=true".to_string());
        args.extend(
            settings
                .extra_hosts
                .iter()
                .map(|host| format!("--add-host={}", host)),
        );
        for mount in &shares {
            args.push("-v".to_string());
            args.push(mount.to_arg());
        }
        args.extend(request.wrapper_args.iter().cloned());
        args.extend(settings.extra_args.iter().cloned());
        args.extend(request.runtime_args.iter().cloned());
        if let Some(path) = extra_shell {
            args.push("-v".to_string());
            args.push(Mount::same_path(path).to_arg());
        }
        if let Some(mount) = bootstrap_mount {
            args.push("-v".to_string());
            args.push(mount.to_arg());
        }

        let hostname = derive_hostname(&request.image);
        args.extend([
            "-h".to_string(),
            hostname,
            "-u".to_string(),
            "root".to_string(),
            request.image.clone(),
            BOOTSTRAP_PATH.to_string(),
            "run".to_string(),
            "--context".to_string(),
            context.encode()?,
        ]);

        info!("Assembled {} invocation for {}", settings.runtime, request.image);
        Ok(AssembledCommand {
            program: settings.runtime.clone(),
            args,
            context,
        })
    }

    /// Working directory inside the container: `cd_to`, else the invocation
    /// directory re-rooted under `mount_to`, else the invocation directory.
    fn container_workdir(&self, root: &Path) -> PathBuf {
        if let Some(cd_to) = &self.settings.cd_to {
            return cd_to.clone();
        }
        let cwd = self
            .host
            .cwd
            .canonicalize()
            .unwrap_or_else(|_| self.host.cwd.clone());
        match &self.settings.mount_to {
            Some(mount_to) => match cwd.strip_prefix(root) {
                Ok(relative) => mount_to.join(relative),
                Err(_) => mount_to.clone(),
            },
            None => cwd,
        }
    }

    async fn capture_terminfo(&self, term: &str) -> Result<TerminfoBlob> {
        let output = self
            .runner
            .run(ProcessCommand::new("infocmp", [term]))
            .await?;
        if !output.success() {
            return Err(LaunchError::Terminfo {
                term: term.to_string(),
                code: output.exit_code,
            });
        }
        debug!("Captured {} bytes of terminfo for {}", output.stdout.len(), term);
        Ok(TerminfoBlob::from_source(term, &output.stdout))
    }

    fn bootstrap_mount(&self, root: &Path) -> Result<Option<Mount>> {
        let Some(binary) = &self.settings.bootstrap_binary else {
            return Ok(None);
        };

        let source = if binary.contains('/') {
            absolutize(binary, root)
        } else {
            which::which(binary).map_err(|source| LaunchError::BootstrapLookup {
                name: binary.clone(),
                source,
            })?
        };
        if !source.is_file() {
            return Err(LaunchError::BootstrapMissing { path: source });
        }

        debug!("Mounting {} from {:?}", BOOTSTRAP_BINARY_NAME, source);
        Ok(Some(Mount {
            source,
            target: BOOTSTRAP_PATH.to_string(),
            read_only: true,
        }))
    }
}

fn resolve_real_path(path: &Path, root: &Path) -> PathBuf {
    let candidate = absolutize(path, root);
    std::fs::canonicalize(&candidate).unwrap_or(candidate)
}
