// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Maps clap's parse failures onto haul's exit statuses.

use clap::Parser;
use clap::error::ErrorKind;
use haul::output::OutputMode;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "haul")]
#[command(about = "Push container images to a remote host over SSH, no shared registry needed")]
#[command(version)]
pub struct Cli {
    /// Options passed through to ssh (e.g. "-i ~/.ssh/deploy -C")
    #[arg(
        short = 's',
        long = "ssh_opts",
        value_name = "OPTS",
        allow_hyphen_values = true
    )]
    pub ssh_opts: Option<String>,

    /// Local registry port (0 picks a free port)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Configuration file (default: haul.yml, then ~/.config/haul/config.yml)
    #[arg(short, long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Only print the final result
    #[arg(short, long, conflicts_with = "json")]
    pub quiet: bool,

    /// Print JSON lines instead of text
    #[arg(long)]
    pub json: bool,

    /// Remote host
    #[arg(value_name = "[USER@]HOST[:PORT]")]
    pub target: String,

    /// Images to transfer, as name[:tag]
    #[arg(value_name = "IMAGE", required = true)]
    pub images: Vec<String>,
}

impl Cli {
    pub fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else if self.quiet {
            OutputMode::Quiet
        } else {
            OutputMode::Normal
        }
    }
}

/// Exit status for a clap parse failure.
pub fn exit_code_for(error: &clap::Error) -> i32 {
    match error.kind() {
        ErrorKind::DisplayHelp
        | ErrorKind::DisplayVersion
        | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => 0,
        ErrorKind::MissingRequiredArgument => 1,
        _ => haul::error::EXIT_FLAG,
    }
}
