mod cli_defaults;
mod commands;
mod dispatch;
mod repl_helpers;
mod runtime_context;
mod shell;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use mender_config::{ElevationSetting, ProviderSetting};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ProviderArg {
    Auto,
    Gemini,
    Openai,
}

impl ProviderArg {
    fn as_setting(self) -> ProviderSetting {
        match self {
            ProviderArg::Auto => ProviderSetting::Auto,
            ProviderArg::Gemini => ProviderSetting::Gemini,
            ProviderArg::Openai => ProviderSetting::Openai,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ElevationArg {
    Root,
    Sudo,
    None,
}

impl ElevationArg {
    fn as_setting(self) -> ElevationSetting {
        match self {
            ElevationArg::Root => ElevationSetting::Root,
            ElevationArg::Sudo => ElevationSetting::Sudo,
            ElevationArg::None => ElevationSetting::None,
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "mender",
    version,
    about = "Run commands and repair what breaks with an AI advisor"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Args)]
pub(crate) struct GlobalArgs {
    /// State directory (defaults to ~/.mender).
    #[arg(long, global = true)]
    home: Option<PathBuf>,
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true, value_enum)]
    provider: Option<ProviderArg>,
    #[arg(long, global = true)]
    model: Option<String>,
    /// Per-command timeout in seconds.
    #[arg(long, global = true)]
    timeout: Option<u64>,
    /// How commands are elevated: root (must already be root), sudo, none.
    #[arg(long, global = true, value_enum)]
    elevation: Option<ElevationArg>,
    /// Approve every repair step without asking.
    #[arg(short = 'y', long, global = true)]
    yes: bool,
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Ask the advisor for a corrected version of a source file.
    Repair { path: PathBuf },
    /// De-obfuscate a file that looks encoded.
    Decrypt { path: PathBuf },
    /// Run a shell command with elevation, repairing it on failure.
    Exec {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Run a shell command exactly as typed.
    Sudo {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Ask for a repair plan for an error message and apply it.
    Fix {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Send one chat message to the assistant.
    Chat {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Show recent commands.
    History {
        #[arg(default_value_t = repl_helpers::DEFAULT_HISTORY_ROWS)]
        limit: usize,
    },
    /// Start the interactive shell (the default with no arguments).
    Shell,
}

fn init_tracing(verbose: bool) {
    let env_filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::builder()
            .with_default_directive(LevelFilter::WARN.into())
            .with_env_var("MENDER_LOG")
            .from_env_lossy()
    };

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

fn normalize_cli_args<I>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = OsString>,
{
    cli_defaults::normalize_cli_args(args)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse_from(normalize_cli_args(std::env::args_os()));
    dispatch::execute(cli)
}
