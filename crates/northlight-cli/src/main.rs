//! Northlight command-line tool entry point.
//!
//! Parses arguments, initializes logging and dispatches to the command
//! handlers in the northlight-cli library.

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use northlight_cli::{CommandContext, OutputFormat, RmdpCommands, commands};

#[derive(Parser)]
#[command(
    name = "northlight",
    about = "Tools for Remedy's Northlight engine packages",
    version,
    author,
    long_about = "A command-line tool for inspecting, verifying, extracting and packing RMDP packages (.bin metadata + .rmdp payload) from Alan Wake, Quantum Break and Control."
)]
struct Cli {
    /// Set the logging level (overridden by RUST_LOG)
    #[arg(short, long, value_enum, global = true, default_value = "warn")]
    log_level: LogLevel,

    /// Output format
    #[arg(short = 'o', long, value_enum, global = true, default_value = "text")]
    format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect, extract and build RMDP packages
    #[command(subcommand)]
    Rmdp(RmdpCommands),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so JSON output stays parseable
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(Level::from(cli.log_level)).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let ctx = CommandContext {
        format: cli.format,
        no_color: cli.no_color,
    };

    match cli.command {
        Commands::Rmdp(cmd) => commands::rmdp::handle(cmd, ctx)?,
    }

    Ok(())
}
