//! Executes bootstrap instructions against the container system.

use super::env_store::{load_env, rewrite_sudoers};
use super::plan::Instruction;
use super::{BootstrapError, Result, io_error};
use crate::env::container::{FALLBACK_SHELL, PREFERRED_SHELL, SUDOERS_PATH};
use crate::env::{terminfo_dir_path, terminfo_source_path};
use crate::process::{CommandRunner, ExecRequest, Outcome, ProcessCommand};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, ErrorKind};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Filesystem and credential effects of the bootstrap.
pub trait SystemOps {
    fn change_dir(&mut self, dir: &Path) -> io::Result<()>;

    /// Create `dir` (and parents) and set its mode
    fn create_dir(&mut self, dir: &Path, mode: u32) -> io::Result<()>;

    fn write_file(&mut self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// Rewrite the sudoers file with a passwordless grant for `user`
    fn grant_sudo(&mut self, user: &str) -> io::Result<()>;

    /// The environment the container started with
    fn environment(&self) -> BTreeMap<String, String>;

    fn path_exists(&self, path: &Path) -> bool;

    /// Reset supplementary groups, then set gid, then set uid
    fn drop_privileges(&mut self, uid: u32, gid: u32) -> Result<()>;
}

/// The real container system.
#[derive(Debug, Clone)]
pub struct LinuxSystem {
    sudoers: PathBuf,
}

impl LinuxSystem {
    pub fn new() -> Self {
        Self {
            sudoers: PathBuf::from(SUDOERS_PATH),
        }
    }

    /// Use a different sudoers file
    pub fn with_sudoers(mut self, path: impl Into<PathBuf>) -> Self {
        self.sudoers = path.into();
        self
    }
}

impl Default for LinuxSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemOps for LinuxSystem {
    fn change_dir(&mut self, dir: &Path) -> io::Result<()> {
        std::env::set_current_dir(dir)
    }

    fn create_dir(&mut self, dir: &Path, mode: u32) -> io::Result<()> {
        fs::create_dir_all(dir)?;
        fs::set_permissions(dir, fs::Permissions::from_mode(mode))
    }

    fn write_file(&mut self, path: &Path, data: &[u8]) -> io::Result<()> {
        fs::write(path, data)
    }

    fn grant_sudo(&mut self, user: &str) -> io::Result<()> {
        let content = match fs::read_to_string(&self.sudoers) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err),
        };
        fs::write(&self.sudoers, rewrite_sudoers(&content, user))
    }

    fn environment(&self) -> BTreeMap<String, String> {
        std::env::vars().collect()
    }

    fn path_exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn drop_privileges(&mut self, uid: u32, gid: u32) -> Result<()> {
        use nix::unistd::{Gid, Uid, setgroups, setresgid, setresuid};

        let (uid, gid) = (Uid::from_raw(uid), Gid::from_raw(gid));
        setgroups(&[gid]).map_err(|source| BootstrapError::Privileges {
            step: "reset supplementary groups",
            source,
        })?;
        // gid first: after setuid the process may no longer change its group
        setresgid(gid, gid, gid).map_err(|source| BootstrapError::Privileges {
            step: "set group id",
            source,
        })?;
        setresuid(uid, uid, uid).map_err(|source| BootstrapError::Privileges {
            step: "set user id",
            source,
        })?;
        Ok(())
    }
}

/// Runs a plan to completion.
pub struct Interpreter<'a, S, R: ?Sized> {
    system: S,
    runner: &'a R,
    env: BTreeMap<String, String>,
}

impl<'a, S, R> Interpreter<'a, S, R>
where
    S: SystemOps,
    R: CommandRunner + ?Sized,
{
    pub fn new(system: S, runner: &'a R) -> Self {
        Self {
            system,
            runner,
            env: BTreeMap::new(),
        }
    }

    pub fn system(&self) -> &S {
        &self.system
    }

    /// Environment resolved so far
    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Execute `steps` in order.
    ///
    /// Returns the shell exec request, or `Exit(0)` when the plan has no
    /// exec step.
    pub async fn execute(&mut self, steps: Vec<Instruction>) -> Result<Outcome> {
        for step in steps {
            if let Some(outcome) = self.step(step).await? {
                return Ok(outcome);
            }
        }
        Ok(Outcome::Exit(0))
    }

    async fn step(&mut self, step: Instruction) -> Result<Option<Outcome>> {
        debug!("Bootstrap step: {:?}", step);
        match step {
            Instruction::ChangeDir(dir) => {
                self.system.change_dir(&dir).map_err(io_error(&dir))?;
            }
            Instruction::EnsureHome { base, mode } => {
                self.system
                    .create_dir(&base, mode)
                    .map_err(io_error(&base))?;
            }
            Instruction::RemoveAccount { name } => {
                self.run_ignoring(ProcessCommand::new("userdel", [name])).await;
            }
            Instruction::CreateGroup { name, gid } => {
                self.run_ignoring(ProcessCommand::new(
                    "groupadd",
                    ["-g".to_string(), gid.to_string(), name],
                ))
                .await;
            }
            Instruction::CreateUser {
                name,
                uid,
                gid,
                home,
            } => {
                self.run_ignoring(ProcessCommand::new(
                    "useradd",
                    [
                        "-d".to_string(),
                        home.to_string_lossy().into_owned(),
                        "-m".to_string(),
                        "-g".to_string(),
                        gid.to_string(),
                        "-u".to_string(),
                        uid.to_string(),
                        name,
                    ],
                ))
                .await;
            }
            Instruction::GrantSudo { name } => {
                self.system
                    .grant_sudo(&name)
                    .map_err(io_error(SUDOERS_PATH))?;
            }
            Instruction::ResolveEnvironment {
                persisted,
                overrides,
                home,
            } => {
                self.env = self.base_environment(persisted.as_deref());
                self.env.extend(overrides);
                self.env
                    .insert("HOME".to_string(), home.to_string_lossy().into_owned());
            }
            Instruction::DropPrivileges { uid, gid } => {
                self.system.drop_privileges(uid, gid)?;
                info!("Dropped privileges to uid={} gid={}", uid, gid);
            }
            Instruction::InstallTerminfo { home, data } => {
                if let Err(e) = self.install_terminfo(&home, &data).await {
                    warn!("Skipping terminfo install: {}", e);
                }
            }
            Instruction::ExecShell { script } => {
                let shell = self.select_shell()?;
                return Ok(Some(Outcome::Exec(ExecRequest {
                    program: shell.to_string(),
                    args: vec!["-c".to_string(), script],
                    env: Some(self.env.clone()),
                })));
            }
        }
        Ok(None)
    }

    fn base_environment(&self, persisted: Option<&Path>) -> BTreeMap<String, String> {
        if let Some(path) = persisted {
            match load_env(path) {
                Ok(env) => {
                    debug!("Restored environment from {:?}", path);
                    return env;
                }
                Err(BootstrapError::Io { source, .. }) if source.kind() == ErrorKind::NotFound => {
                    debug!("No persisted environment at {:?}", path);
                }
                Err(e) => warn!("Ignoring persisted environment: {}", e),
            }
        }
        self.system.environment()
    }

    async fn install_terminfo(&mut self, home: &Path, data: &str) -> Result<()> {
        let source = STANDARD.decode(data)?;
        let dir = terminfo_dir_path(home);
        let file = terminfo_source_path(home);

        self.system.create_dir(&dir, 0o755).map_err(io_error(&dir))?;
        self.system
            .write_file(&file, &source)
            .map_err(io_error(&file))?;

        let output = self
            .runner
            .run(
                ProcessCommand::new("tic", [file.to_string_lossy().into_owned()])
                    .with_envs(self.env.clone()),
            )
            .await?;
        if !output.success() {
            warn!("tic exited with status {}", output.exit_code);
        }
        Ok(())
    }

    fn select_shell(&self) -> Result<&'static str> {
        [PREFERRED_SHELL, FALLBACK_SHELL]
            .into_iter()
            .find(|shell| self.system.path_exists(Path::new(shell)))
            .ok_or(BootstrapError::NoShell {
                preferred: PREFERRED_SHELL,
                fallback: FALLBACK_SHELL,
            })
    }

    async fn run_ignoring(&self, cmd: ProcessCommand) {
        let shown = cmd.display();
        match self.runner.run(cmd).await {
            Ok(output) if !output.success() => {
                debug!("`{}` exited with {} (ignored)", shown, output.exit_code);
            }
            Ok(_) => {}
            Err(e) => warn!("`{}` failed to start (ignored): {}", shown, e),
        }
    }
}
