//! Persisted environment snapshots and the sudoers rewrite.

use super::{Result, io_error};
use crate::env::container::SHELL_DEPTH_VAR;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

/// Read a persisted environment snapshot.
pub fn load_env(path: &Path) -> Result<BTreeMap<String, String>> {
    let data = fs::read(path).map_err(io_error(path))?;
    Ok(serde_json::from_slice(&data)?)
}

/// Write `vars` as a snapshot, leaving out the shell nesting counter.
pub fn dump_env<I>(path: &Path, vars: I) -> Result<()>
where
    I: IntoIterator<Item = (String, String)>,
{
    let env: BTreeMap<String, String> = vars
        .into_iter()
        .filter(|(key, _)| key != SHELL_DEPTH_VAR)
        .collect();
    let data = serde_json::to_vec(&env)?;
    fs::write(path, data).map_err(io_error(path))?;
    debug!("Persisted {} environment variables to {:?}", env.len(), path);
    Ok(())
}

/// Sudoers entry granting `user` unrestricted passwordless sudo.
pub fn sudo_grant(user: &str) -> String {
    format!("{} ALL=(ALL) NOPASSWD: ALL", user)
}

/// Drop every entry whose first field is `user`, then append a fresh grant.
///
/// Applying this twice yields the same file.
pub fn rewrite_sudoers(content: &str, user: &str) -> String {
    let mut out = String::with_capacity(content.len() + user.len() + 32);
    for line in content.lines() {
        if line.split_whitespace().next() == Some(user) {
            continue;
        }
        out.push_str(line);
        out.push('\n');
    }
    out.push_str(&sudo_grant(user));
    out.push('\n');
    out
}
