//! Translation of a [`BootstrapContext`] into bootstrap instructions.

use super::BootstrapContext;
use crate::config::PrefixCommand;
use crate::env::container::{BOOTSTRAP_PATH, STATUS_VAR};
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Mode applied to the directory holding the user's home.
pub const HOME_MODE: u32 = 0o755;

/// One step of the bootstrap sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    ChangeDir(PathBuf),
    /// Create the parent of the home directory and force it to `mode`.
    /// The home itself is created by `useradd -m` so it gets the user as owner.
    EnsureHome { base: PathBuf, mode: u32 },
    /// Delete a stale account of the same name; failure is ignored
    RemoveAccount { name: String },
    CreateGroup { name: String, gid: u32 },
    CreateUser {
        name: String,
        uid: u32,
        gid: u32,
        home: PathBuf,
    },
    GrantSudo { name: String },
    /// Build the user's environment
    ResolveEnvironment {
        persisted: Option<PathBuf>,
        overrides: BTreeMap<String, String>,
        home: PathBuf,
    },
    /// Reset groups, then setgid, then setuid
    DropPrivileges { uid: u32, gid: u32 },
    /// Best effort; failure is logged and ignored
    InstallTerminfo { home: PathBuf, data: String },
    /// Replace the process with a shell running `script`
    ExecShell { script: String },
}

/// Build the instruction list for `context`.
pub fn plan(context: &BootstrapContext) -> Vec<Instruction> {
    let user = &context.user;
    let base = user
        .home
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("/"));

    let mut steps = vec![
        Instruction::ChangeDir(context.workdir.clone()),
        Instruction::EnsureHome {
            base,
            mode: HOME_MODE,
        },
        Instruction::RemoveAccount {
            name: user.name.clone(),
        },
        Instruction::CreateGroup {
            name: user.name.clone(),
            gid: user.gid,
        },
        Instruction::CreateUser {
            name: user.name.clone(),
            uid: user.uid,
            gid: user.gid,
            home: user.home.clone(),
        },
        Instruction::GrantSudo {
            name: user.name.clone(),
        },
        Instruction::ResolveEnvironment {
            persisted: context.persist_environment.clone(),
            overrides: context.env_overrides.clone(),
            home: user.home.clone(),
        },
        Instruction::DropPrivileges {
            uid: user.uid,
            gid: user.gid,
        },
    ];

    if let Some(terminfo) = &context.terminfo {
        steps.push(Instruction::InstallTerminfo {
            home: user.home.clone(),
            data: terminfo.data.clone(),
        });
    }

    steps.push(Instruction::ExecShell {
        script: compose_script(context),
    });
    steps
}

/// Compose the single command string handed to the shell.
///
/// Pieces are joined with `"; "`. The user command tokens are joined with
/// spaces and not quoted, so shell syntax in them is interpreted.
pub fn compose_script(context: &BootstrapContext) -> String {
    let mut parts = Vec::new();

    if let Some(extra_shell) = &context.extra_shell {
        parts.push(format!("source {}", quote_path(extra_shell)));
    }

    match &context.prefix {
        Some(PrefixCommand::Verbose(cmd)) => {
            parts.push(format!("{} < /dev/null", group(cmd)));
        }
        Some(PrefixCommand::Quiet(cmd)) => {
            parts.push(format!("{} < /dev/null > /dev/null 2>&1", group(cmd)));
        }
        None => {}
    }

    let has_command = !context.command.is_empty();
    if has_command {
        parts.push(group(&context.command));
        parts.push(format!("{}=$?", STATUS_VAR));
    }

    if let Some(path) = &context.persist_environment {
        parts.push(format!("{} dump-env {}", BOOTSTRAP_PATH, quote_path(path)));
    }

    if has_command {
        parts.push(format!("exit ${}", STATUS_VAR));
    }

    parts.join("; ")
}

fn group(tokens: &[String]) -> String {
    format!("{{ {}; }}", tokens.join(" "))
}

fn quote_path(path: &Path) -> Cow<'static, str> {
    let text = path.to_string_lossy().into_owned();
    shell_escape::escape(Cow::Owned(text))
}
