//! Ambroute CLI Application

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ambroute")]
#[command(author, version, about = "Channel routing conflict checker for ambient soundscapes", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file (default: <config dir>/ambroute/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the channel layouts of the active catalog
    Layouts,

    /// Detect routing conflicts in a session
    Check {
        /// Session file (TOML)
        session: PathBuf,

        /// Output the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Propose, and optionally apply, resolutions for a session
    Resolve {
        /// Session file (TOML)
        session: PathBuf,

        /// Output the resolutions as JSON
        #[arg(long)]
        json: bool,

        /// Apply the resolutions and write the updated session
        #[arg(long)]
        apply: bool,

        /// Where to write the updated session (default: in place)
        #[arg(short, long, requires = "apply")]
        output: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "ambroute_core=debug,ambroute_infra=debug,info"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)))
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = commands::load_config(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Layouts => commands::layouts(&config).await,
        Commands::Check { session, json } => commands::check(&config, &session, json).await,
        Commands::Resolve {
            session,
            json,
            apply,
            output,
        } => commands::resolve(&config, &session, json, apply, output.as_deref()).await,
    }
}
