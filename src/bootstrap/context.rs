//! Serializable record handed from the host launcher to the bootstrap.

use super::{BootstrapError, Result};
use crate::config::PrefixCommand;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Bumped whenever the record layout changes.
pub const PROTOCOL_VERSION: u32 = 1;

/// Host identity recreated inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    pub name: String,
    pub uid: u32,
    pub gid: u32,
    pub home: PathBuf,
}

/// Compiled-terminal source captured on the host with `infocmp`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminfoBlob {
    /// Terminal type the data describes
    pub term: String,
    /// Base64-encoded `infocmp` output
    pub data: String,
}

impl TerminfoBlob {
    /// Encode raw `infocmp` output.
    pub fn from_source(term: impl Into<String>, source: &[u8]) -> Self {
        Self {
            term: term.into(),
            data: STANDARD.encode(source),
        }
    }

    /// Decode back to terminfo source text.
    pub fn source(&self) -> Result<Vec<u8>> {
        Ok(STANDARD.decode(&self.data)?)
    }
}

/// Everything the bootstrap needs, created once on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapContext {
    pub protocol_version: u32,
    /// Directory the user command runs in
    pub workdir: PathBuf,
    /// Build root on the host
    pub root_dir: PathBuf,
    pub user: UserIdentity,
    /// Variables forced into the user's environment
    #[serde(default)]
    pub env_overrides: BTreeMap<String, String>,
    /// User command tokens; when empty the shell only runs the prefix and
    /// persistence pieces, then exits
    #[serde(default)]
    pub command: Vec<String>,
    #[serde(default)]
    pub terminfo: Option<TerminfoBlob>,
    /// Persisted-environment snapshot, restored and saved
    #[serde(default)]
    pub persist_environment: Option<PathBuf>,
    /// File sourced before the user command
    #[serde(default)]
    pub extra_shell: Option<PathBuf>,
    #[serde(default)]
    pub prefix: Option<PrefixCommand>,
}

impl BootstrapContext {
    /// Serialize to the base64 JSON blob passed on the command line.
    pub fn encode(&self) -> Result<String> {
        let json = serde_json::to_vec(self)?;
        Ok(STANDARD.encode(json))
    }

    /// Decode a blob and check its protocol version.
    pub fn decode(blob: &str) -> Result<Self> {
        let json = STANDARD.decode(blob.trim())?;
        let context: Self = serde_json::from_slice(&json)?;
        if context.protocol_version != PROTOCOL_VERSION {
            return Err(BootstrapError::ProtocolMismatch {
                expected: PROTOCOL_VERSION,
                found: context.protocol_version,
            });
        }
        Ok(context)
    }
}
