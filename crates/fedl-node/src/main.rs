use anyhow::Result;
use clap::{Parser, Subcommand};
use fedl_node::{cli, logging, NodeConfig};
use std::path::PathBuf;
use tracing::warn;

#[derive(Parser)]
#[command(name = "fedl")]
#[command(about = "Federated-learning task registry node", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbosity level (can be repeated)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Output file for the configuration
        #[arg(short, long, default_value = "fedl.toml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Execute a file of transactions against the ledger
    Replay {
        /// JSON array or JSON-lines file of transactions
        file: PathBuf,

        /// Write responses to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Leave the snapshot file untouched
        #[arg(long)]
        dry_run: bool,
    },

    /// Summarize the persisted ledger state
    Inspect,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // File, then environment, then command line
    let mut config = match &cli.config {
        Some(path) => NodeConfig::from_file(path)?,
        None => NodeConfig::default(),
    };
    config.apply_env_overrides();

    logging::init_logging(&config.logging, cli.verbose)?;

    match cli.command {
        Commands::Init { output, force } => cli::run_init(&output, force)?,
        Commands::Replay {
            file,
            output,
            dry_run,
        } => {
            let rejected = cli::run_replay(config, &file, !dry_run, output.as_deref()).await?;
            if rejected > 0 {
                warn!(rejected, "⚠️ Some transactions were rejected");
            }
        }
        Commands::Inspect => cli::run_inspect(config).await?,
    }

    Ok(())
}
