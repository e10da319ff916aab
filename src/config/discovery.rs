//! Config file discovery and parsing.
//!
//! The config file is found by walking up from the invocation directory. Its
//! format is one directive per line, `name token token ...`, with shell-style
//! quoting and `#` comments. A repeated directive replaces the earlier one.

use super::{ConfigError, ParamSet, Result};
use crate::env;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Base configuration as read from disk, before overrides.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    /// Directory containing the marker file (the build root)
    pub root_dir: PathBuf,
    /// Full path of the marker file
    pub config_path: PathBuf,
    /// Parsed directives
    pub params: ParamSet,
}

/// Locates and parses the declarative configuration file.
pub struct ConfigResolver;

impl ConfigResolver {
    /// Discover the config file above `start_dir` and parse it.
    pub fn resolve(start_dir: &Path) -> Result<ResolvedConfig> {
        let (root_dir, config_path) = Self::discover(start_dir)?;
        let params = Self::parse_file(&config_path)?;
        Ok(ResolvedConfig {
            root_dir,
            config_path,
            params,
        })
    }

    /// Walk up from `start_dir` looking for a marker file.
    ///
    /// Returns the canonical directory containing the marker and the marker
    /// path itself. The filesystem root is never searched.
    pub fn discover(start_dir: &Path) -> Result<(PathBuf, PathBuf)> {
        let mut dir = start_dir.canonicalize().map_err(|source| ConfigError::Io {
            path: start_dir.to_path_buf(),
            source,
        })?;

        while let Some(parent) = dir.parent() {
            for name in env::CONFIG_MARKERS {
                let candidate = dir.join(name);
                debug!("Checking for config file: {:?}", candidate);
                if candidate.is_file() {
                    debug!("Found config file: {:?}", candidate);
                    return Ok((dir, candidate));
                }
            }
            dir = parent.to_path_buf();
        }

        Err(ConfigError::NotFound {
            start: start_dir.to_path_buf(),
        })
    }

    /// Read and parse a config file.
    pub fn parse_file(path: &Path) -> Result<ParamSet> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse_str(&content, path)
    }

    /// Parse config text. `path` is used only for error reporting.
    pub fn parse_str(content: &str, path: &Path) -> Result<ParamSet> {
        let mut params = ParamSet::new();

        for (idx, raw_line) in content.lines().enumerate() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut tokens = shell_words::split(line).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                line: idx + 1,
                source,
            })?;
            if tokens.is_empty() {
                continue;
            }

            let key = tokens.remove(0);
            if params.insert(key.clone(), tokens).is_some() {
                debug!("Directive {} redefined on line {}", key, idx + 1);
            }
        }

        Ok(params)
    }
}
