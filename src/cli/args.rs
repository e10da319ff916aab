//! Wrapper flag parsing for the `drun` launcher
//!
//! The launcher's own flags all start with `--drun-` and must come first:
//!
//! ```text
//! drun [--drun-FLAG]... [RUNTIME_ARGS... --] USER_COMMAND...
//! ```
//!
//! Scanning stops at the first token without the prefix, or right after an
//! informational flag (`ctx`, `print-image`, `show-config`, `help`), in which
//! case the rest of the command line is ignored. Of what remains, tokens
//! before a `--` are passed to the container runtime and tokens after it form
//! the user command; without `--` everything is the user command.

use crate::env::FLAG_PREFIX;
use clap::{CommandFactory, Parser};

/// What the invocation asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliAction {
    /// Launch the container
    Run,
    /// Print the runtime invocation instead of executing it
    PrintCommand,
    /// Print the build-context fingerprint
    PrintContext,
    /// Print the resolved image
    PrintImage,
    /// Print the final configuration
    ShowConfig,
    /// Print flag help
    Help,
}

impl CliAction {
    /// Informational actions end flag scanning and never launch anything
    pub fn is_informational(self) -> bool {
        matches!(
            self,
            Self::PrintContext | Self::PrintImage | Self::ShowConfig | Self::Help
        )
    }
}

/// Parsed wrapper options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliOptions {
    pub action: CliAction,
    /// Fingerprint to use instead of the computed one
    pub use_ctx: Option<String>,
    /// Image to use instead of the configured one
    pub override_image: Option<String>,
    /// Rebuild the image before launching
    pub rebuild: bool,
    /// Runtime arguments from `--drun-extra-args`
    pub extra_args: Vec<String>,
    /// Runtime arguments given before `--`
    pub runtime_args: Vec<String>,
}

/// Command to run inside the container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserCommand {
    pub argv: Vec<String>,
}

/// Wrapper flag errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Unknown or malformed `--drun-` flag
    #[error("{0}")]
    Flags(#[from] clap::Error),

    /// `--drun-extra-args` value is not valid shell words
    #[error("failed to parse --drun-extra-args {value:?}: {source}")]
    ExtraArgs {
        value: String,
        #[source]
        source: shell_words::ParseError,
    },
}

#[derive(Debug, Parser)]
#[command(name = "drun")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a command in a container as the invoking user")]
#[command(
    override_usage = "drun [--drun-FLAG]... [RUNTIME_ARGS... --] COMMAND...",
    no_binary_name = true,
    disable_help_flag = true,
    disable_version_flag = true,
    args_override_self = true
)]
struct WrapperFlags {
    /// Print the runtime command instead of executing it
    #[arg(long = "drun-print")]
    print: bool,
    /// Print the build-context fingerprint
    #[arg(long = "drun-ctx")]
    ctx: bool,
    /// Print the resolved image
    #[arg(long = "drun-print-image")]
    print_image: bool,
    /// Use this fingerprint instead of computing one
    #[arg(long = "drun-use-ctx", value_name = "SHA", require_equals = true)]
    use_ctx: Option<String>,
    /// Use this image instead of the configured one
    #[arg(long = "drun-img", value_name = "IMAGE", require_equals = true)]
    img: Option<String>,
    /// Rebuild the image before launching
    #[arg(long = "drun-rebuild")]
    rebuild: bool,
    /// Add shell-quoted arguments to the runtime invocation
    #[arg(
        long = "drun-extra-args",
        value_name = "ARGS",
        require_equals = true,
        allow_hyphen_values = true
    )]
    extra_args: Vec<String>,
    /// Print the final configuration
    #[arg(long = "drun-show-config")]
    show_config: bool,
    /// Print this help
    #[arg(long = "drun-help")]
    help: bool,
}

impl WrapperFlags {
    fn action(&self) -> CliAction {
        if self.help {
            CliAction::Help
        } else if self.show_config {
            CliAction::ShowConfig
        } else if self.print_image {
            CliAction::PrintImage
        } else if self.ctx {
            CliAction::PrintContext
        } else if self.print {
            CliAction::PrintCommand
        } else {
            CliAction::Run
        }
    }
}

/// Rendered help for the wrapper flags
pub fn help_text() -> String {
    WrapperFlags::command().render_help().to_string()
}

fn is_informational_flag(arg: &str) -> bool {
    matches!(
        arg,
        "--drun-ctx" | "--drun-print-image" | "--drun-show-config" | "--drun-help"
    )
}

/// Split a command line (without the program name) into wrapper options and
/// the user command.
pub fn parse_invocation(args: &[String]) -> Result<(CliOptions, UserCommand), CliError> {
    let mut flag_count = 0;
    let mut informational = false;
    for arg in args {
        if !arg.starts_with(FLAG_PREFIX) {
            break;
        }
        flag_count += 1;
        if is_informational_flag(arg) {
            informational = true;
            break;
        }
    }

    let flags = WrapperFlags::try_parse_from(&args[..flag_count])?;

    let mut extra_args = Vec::new();
    for value in &flags.extra_args {
        let words = shell_words::split(value).map_err(|source| CliError::ExtraArgs {
            value: value.clone(),
            source,
        })?;
        extra_args.extend(words);
    }

    let (runtime_args, argv) = if informational {
        (Vec::new(), Vec::new())
    } else {
        let rest = &args[flag_count..];
        match rest.iter().position(|arg| arg == "--") {
            Some(pos) => (rest[..pos].to_vec(), rest[pos + 1..].to_vec()),
            None => (Vec::new(), rest.to_vec()),
        }
    };

    Ok((
        CliOptions {
            action: flags.action(),
            use_ctx: flags.use_ctx,
            override_image: flags.img,
            rebuild: flags.rebuild,
            extra_args,
            runtime_args,
        },
        UserCommand { argv },
    ))
}
