//! shellpilot CLI: the main entry point.
//!
//! Commands:
//! - `repl`:     Interactive agent sessions, or one with `--message`
//! - `serve`:    Tool protocol server over stdio
//! - `run`:      Run an ad-hoc shell batch
//! - `backends`: List the endpoint table

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "shellpilot",
    about = "shellpilot: a model-driven shell agent",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to ~/.shellpilot/config.toml)
    #[arg(short, long, global = true, env = "SHELLPILOT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run agent sessions against the configured backend
    Repl {
        /// Run a single session for this directive instead of reading stdin
        #[arg(short, long)]
        message: Option<String>,
    },

    /// Serve the shell tool over JSON-RPC on stdin/stdout
    Serve,

    /// Run shell commands in order and print the results as JSON
    Run {
        /// Per-command timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Keep going after a failed command
        #[arg(short, long)]
        keep_going: bool,

        /// Commands to run, each one passed to the shell as-is
        #[arg(last = true, required = true)]
        commands: Vec<String>,
    },

    /// List known backends and their endpoints
    Backends,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // stdout carries the protocol in `serve`, so logs go to stderr
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Repl { message } => commands::repl::run(config, message).await?,
        Commands::Serve => commands::serve::run(config).await?,
        Commands::Run {
            timeout,
            keep_going,
            commands,
        } => commands::run::run(config, commands, timeout, keep_going).await?,
        Commands::Backends => commands::backends::run(&config)?,
    }

    Ok(())
}
