//! Declarative configuration: discovery, environment overrides and validation.
//!
//! The configuration pipeline is strictly ordered:
//!
//! 1. [`ConfigResolver`] walks up from the invocation directory, finds the
//!    marker file and parses it into an immutable base [`ParamSet`].
//! 2. [`EnvOverrideResolver`] turns `DRUN_OPT_{SET,ADD,DEL}_*` variables into an
//!    explicit, ordered list of [`OverrideDirective`]s and applies them in one pass.
//! 3. [`Settings::from_params`] validates the final parameter set once and
//!    produces the typed record the rest of the launcher reads.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub mod discovery;
pub mod overrides;
pub mod settings;

pub use discovery::{ConfigResolver, ResolvedConfig};
pub use overrides::{EnvOverrideResolver, OverrideDirective, OverrideOp, normalize_uuid};
pub use settings::{PrefixCommand, Settings, directives};

/// Directive name mapped to its argument tokens.
pub type ParamSet = BTreeMap<String, Vec<String>>;

/// Configuration errors. All of them are fatal to an invocation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// No marker file between the start directory and the filesystem root
    #[error("never found a config file (.drun_root or drun_root) above {}", start.display())]
    NotFound { start: PathBuf },

    /// Config file could not be read
    #[error("failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A config line is not valid shell words
    #[error("failed to parse {} line {line}: {source}", path.display())]
    Parse {
        path: PathBuf,
        line: usize,
        #[source]
        source: shell_words::ParseError,
    },

    /// An override variable value is not valid shell words
    #[error("failed to parse override {var}: {source}")]
    Override {
        var: String,
        #[source]
        source: shell_words::ParseError,
    },

    /// A required directive is absent
    #[error("{directive} must be specified in {}", path.display())]
    MissingDirective {
        directive: &'static str,
        path: PathBuf,
    },

    /// Two mutually exclusive directives are both present
    #[error("must specify at most one of {first} and {second}")]
    Conflict {
        first: &'static str,
        second: &'static str,
    },

    /// A directive has the wrong number of arguments
    #[error("{directive} expects {expected} argument(s), got {found}")]
    Arity {
        directive: &'static str,
        expected: &'static str,
        found: usize,
    },

    /// Current directory could not be resolved
    #[error("failed to resolve {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Fully resolved configuration for one invocation.
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Directory containing the marker file
    pub root_dir: PathBuf,
    /// Marker file that was parsed
    pub config_path: PathBuf,
    /// Parameter set after overrides
    pub params: ParamSet,
    /// Typed view of `params`
    pub settings: Settings,
}

/// Run discovery, overrides and validation in order.
///
/// `vars` is the environment snapshot overrides are read from.
pub fn load<I>(start_dir: &Path, vars: I) -> Result<LoadedConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let resolved = ConfigResolver::resolve(start_dir)?;
    let resolver = EnvOverrideResolver::from_params(&resolved.params);
    let params = resolver.resolve(&resolved.params, vars)?;
    let settings = Settings::from_params(&params, &resolved.config_path)?;

    Ok(LoadedConfig {
        root_dir: resolved.root_dir,
        config_path: resolved.config_path,
        params,
        settings,
    })
}
