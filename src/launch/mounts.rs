//! Bind mounts passed to the container runtime.

use crate::process::{CommandRunner, ProcessCommand};
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// One `-v` bind mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mount {
    pub source: PathBuf,
    /// In-container path, kept verbatim (may carry `:options`)
    pub target: String,
    pub read_only: bool,
}

impl Mount {
    /// Mount `path` at the same location inside the container
    pub fn same_path(path: PathBuf) -> Self {
        Self {
            target: path.to_string_lossy().into_owned(),
            source: path,
            read_only: false,
        }
    }

    /// Value for the runtime's `-v` flag
    pub fn to_arg(&self) -> String {
        let mut arg = format!("{}:{}", self.source.display(), self.target);
        if self.read_only {
            arg.push_str(":ro");
        }
        arg
    }
}

/// Make `path` absolute against `root`, with `.` and `..` resolved.
pub fn absolutize(path: impl AsRef<Path>, root: &Path) -> PathBuf {
    let path = path.as_ref();
    if path.is_absolute() {
        normalize(path)
    } else {
        normalize(&root.join(path))
    }
}

/// Resolve `.` and `..` components without touching the filesystem.
/// `..` at the filesystem root stays at the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }
    out
}

/// Resolve `$NAME` indirection; `None` when the variable is unset.
pub fn expand_share(share: &str, env: &BTreeMap<String, String>) -> Option<String> {
    match share.strip_prefix('$') {
        Some(name) => env.get(name).cloned(),
        None => Some(share.to_string()),
    }
}

/// Parse `source[:target]`. The source is made absolute against `root`; the
/// target defaults to the absolute source.
pub fn parse_share(share: &str, root: &Path) -> Mount {
    match share.split_once(':') {
        Some((source, target)) => Mount {
            source: absolutize(source, root),
            target: target.to_string(),
            read_only: false,
        },
        None => Mount::same_path(absolutize(share, root)),
    }
}

/// Mounts for the `extra_shares` directive, skipping unset `$NAME` entries.
pub fn share_mounts(
    shares: &[String],
    root: &Path,
    env: &BTreeMap<String, String>,
) -> Vec<Mount> {
    shares
        .iter()
        .filter_map(|share| {
            let expanded = expand_share(share, env);
            if expanded.is_none() {
                debug!("Skipping share {:?}: variable is unset", share);
            }
            expanded
        })
        .map(|share| parse_share(&share, root))
        .collect()
}

/// Git common directory of the checkout at `root`, when it lives outside
/// `root`. Any failure to query git means there is nothing to mount.
pub async fn external_git_dir<R>(runner: &R, root: &Path) -> Option<PathBuf>
where
    R: CommandRunner + ?Sized,
{
    let output = runner
        .run(ProcessCommand::new("git", ["rev-parse", "--git-common-dir"]).with_working_dir(root))
        .await
        .ok()?;
    if !output.success() {
        debug!("Not a git checkout: {:?}", root);
        return None;
    }

    let raw = output.stdout_text();
    if raw.is_empty() {
        return None;
    }
    let git_dir = absolutize(&raw, root);
    if git_dir.starts_with(root) {
        None
    } else {
        debug!("Sharing external git dir {:?}", git_dir);
        Some(git_dir)
    }
}
