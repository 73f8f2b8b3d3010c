// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `execd`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "execd",
    version,
    about = "Run a command on request and stream its output over HTTP.",
    long_about = None
)]
pub struct CliArgs {
    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `EXECD_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Serve `<cmd> [args...]` over HTTP; each request runs it once.
    Serve(ServeArgs),
}

#[derive(Debug, Clone, Args)]
pub struct ServeArgs {
    /// Path to a config file (TOML).
    ///
    /// Default: `Execd.toml` in the current directory, if it exists.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Port to listen on [default: 6000].
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Interface to bind [default: 0.0.0.0].
    #[arg(long)]
    pub host: Option<String>,

    /// Maximum number of concurrent executions [default: 1].
    #[arg(long)]
    pub parallelism: Option<usize>,

    /// Base command run for each request.
    #[arg(value_name = "CMD")]
    pub cmd: String,

    /// Arguments always passed before the per-request args.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "ARGS")]
    pub args: Vec<String>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
