//! Environment-variable driven configuration overrides.
//!
//! A variable named `DRUN_OPT_<OP>_<key>` mutates directive `<key>`:
//!
//! - `SET` replaces the directive with the shell-split variable value
//! - `ADD` appends the shell-split value, creating the directive if needed
//! - `DEL` removes the directive; the value is ignored
//!
//! A `UUID_<uuid>_` infix after the operation scopes the override to the
//! config whose `uuid` directive matches (hyphens stripped, ASCII case
//! ignored). Scoped overrides never apply to a config without a `uuid`.
//!
//! Directives are applied in lexicographic order of the variable name so the
//! outcome never depends on environment enumeration order.

use super::{ConfigError, ParamSet, Result, directives};
use crate::env::overrides::{ADD_PREFIX, DEL_PREFIX, SET_PREFIX, UUID_SCOPE};
use tracing::debug;
use uuid::Uuid;

/// Mutation requested by an override variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideOp {
    Set,
    Add,
    Del,
}

/// One applicable override, derived from a single environment variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideDirective {
    pub op: OverrideOp,
    /// Normalized UUID scope, if the variable carried one
    pub scope: Option<String>,
    /// Directive being mutated
    pub key: String,
    /// Raw variable value, shell-split when applied
    pub value: String,
    /// Variable the directive came from
    pub source_var: String,
}

/// Normalize a configured instance UUID for scope comparison.
///
/// Well-formed UUIDs are rendered in their hyphen-less simple form; anything
/// else just has its hyphens stripped.
pub fn normalize_uuid(raw: &str) -> String {
    match Uuid::parse_str(raw) {
        Ok(uuid) => uuid.simple().to_string(),
        Err(_) => raw.replace('-', ""),
    }
}

/// Resolves override directives against an optional instance UUID.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrideResolver {
    uuid: Option<String>,
}

impl EnvOverrideResolver {
    /// Create a resolver scoped to `uuid`.
    pub fn new(uuid: Option<&str>) -> Self {
        Self {
            uuid: uuid.map(normalize_uuid).filter(|u| !u.is_empty()),
        }
    }

    /// Create a resolver scoped to the `uuid` directive of `params`.
    pub fn from_params(params: &ParamSet) -> Self {
        Self::new(
            params
                .get(directives::UUID)
                .and_then(|values| values.first())
                .map(String::as_str),
        )
    }

    /// The normalized instance UUID, if any.
    pub fn uuid(&self) -> Option<&str> {
        self.uuid.as_deref()
    }

    /// Interpret one variable. Returns `None` for unrelated variables and for
    /// scoped variables that do not apply to this instance.
    pub fn parse(&self, name: &str, value: &str) -> Option<OverrideDirective> {
        let (op, rest) = if let Some(rest) = name.strip_prefix(SET_PREFIX) {
            (OverrideOp::Set, rest)
        } else if let Some(rest) = name.strip_prefix(ADD_PREFIX) {
            (OverrideOp::Add, rest)
        } else if let Some(rest) = name.strip_prefix(DEL_PREFIX) {
            (OverrideOp::Del, rest)
        } else {
            return None;
        };

        let (scope, key) = match rest.strip_prefix(UUID_SCOPE) {
            None => (None, rest),
            Some(scoped) => {
                let uuid = self.uuid.as_deref()?;
                let (raw_scope, key) = scoped.split_once('_')?;
                let scope = raw_scope.replace('-', "");
                if !scope.eq_ignore_ascii_case(uuid) {
                    debug!("Ignoring override {} scoped to another instance", name);
                    return None;
                }
                (Some(scope), key)
            }
        };

        if key.is_empty() {
            return None;
        }

        Some(OverrideDirective {
            op,
            scope,
            key: key.to_string(),
            value: value.to_string(),
            source_var: name.to_string(),
        })
    }

    /// Collect every applicable directive from an environment snapshot, in
    /// application order.
    pub fn collect<I>(&self, vars: I) -> Vec<OverrideDirective>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut found: Vec<OverrideDirective> = vars
            .into_iter()
            .filter_map(|(name, value)| self.parse(&name, &value))
            .collect();
        found.sort_by(|a, b| a.source_var.cmp(&b.source_var));
        found
    }

    /// Apply directives in order to a copy of `base`.
    pub fn apply(base: &ParamSet, directives: &[OverrideDirective]) -> Result<ParamSet> {
        let mut params = base.clone();

        for directive in directives {
            debug!(
                "Applying {:?} override to {} from {}",
                directive.op, directive.key, directive.source_var
            );
            match directive.op {
                OverrideOp::Del => {
                    params.remove(&directive.key);
                }
                OverrideOp::Add => {
                    let tokens = split_value(directive)?;
                    params
                        .entry(directive.key.clone())
                        .or_default()
                        .extend(tokens);
                }
                OverrideOp::Set => {
                    let tokens = split_value(directive)?;
                    params.insert(directive.key.clone(), tokens);
                }
            }
        }

        Ok(params)
    }

    /// Collect and apply in one step.
    pub fn resolve<I>(&self, base: &ParamSet, vars: I) -> Result<ParamSet>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let directives = self.collect(vars);
        Self::apply(base, &directives)
    }
}

fn split_value(directive: &OverrideDirective) -> Result<Vec<String>> {
    shell_words::split(&directive.value).map_err(|source| ConfigError::Override {
        var: directive.source_var.clone(),
        source,
    })
}
