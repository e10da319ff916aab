//! Snapshot of the invoking process.

use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing::debug;

/// Everything the launcher reads from its own process, gathered once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostContext {
    /// Invocation directory, symlinks resolved
    pub cwd: PathBuf,
    /// Environment snapshot
    pub env: BTreeMap<String, String>,
    pub uid: u32,
    pub gid: u32,
    pub username: String,
    /// Both stdin and stdout are terminals
    pub tty: bool,
    /// Exec argument size limit, when the platform reports one
    pub arg_max: Option<usize>,
}

impl HostContext {
    /// Capture the current process state.
    pub fn capture() -> std::io::Result<Self> {
        use nix::unistd::{SysconfVar, getgid, getuid, sysconf};

        // canonical, like the discovered config root
        let cwd = std::env::current_dir()?.canonicalize()?;
        let env: BTreeMap<String, String> = std::env::vars().collect();
        let uid = getuid().as_raw();
        let gid = getgid().as_raw();
        let username = resolve_username(&env, uid);
        let tty = std::io::stdin().is_terminal() && std::io::stdout().is_terminal();
        let arg_max = sysconf(SysconfVar::ARG_MAX)
            .ok()
            .flatten()
            .and_then(|limit| usize::try_from(limit).ok());

        debug!(
            "Host context: cwd={:?} uid={} gid={} user={} tty={} arg_max={:?}",
            cwd, uid, gid, username, tty, arg_max
        );

        Ok(Self {
            cwd,
            env,
            uid,
            gid,
            username,
            tty,
            arg_max,
        })
    }

    /// Look up a variable in the snapshot
    pub fn var(&self, name: &str) -> Option<&str> {
        self.env.get(name).map(String::as_str)
    }
}

/// Pick the invoking user's name: `USER`, then `LOGNAME`, then the passwd
/// entry for `uid`, then the numeric uid.
pub fn resolve_username(env: &BTreeMap<String, String>, uid: u32) -> String {
    ["USER", "LOGNAME"]
        .iter()
        .filter_map(|key| env.get(*key))
        .find(|name| !name.is_empty())
        .cloned()
        .or_else(|| {
            nix::unistd::User::from_uid(nix::unistd::Uid::from_raw(uid))
                .ok()
                .flatten()
                .map(|user| user.name)
                .filter(|name| !name.is_empty())
        })
        .unwrap_or_else(|| uid.to_string())
}
