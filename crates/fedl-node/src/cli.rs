use crate::config::NodeConfig;
use crate::node::{read_requests, FedlNode};
use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

/// Write a default configuration file
pub fn run_init(output: &Path, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!("{} already exists, pass --force to overwrite", output.display());
    }
    NodeConfig::default().save_to_file(output)?;
    info!(path = %output.display(), "✨ Configuration written");
    Ok(())
}

/// Replay a transaction file and print one JSON response per transaction.
///
/// Returns the number of rejected transactions.
pub async fn run_replay(
    config: NodeConfig,
    file: &Path,
    persist: bool,
    output: Option<&Path>,
) -> Result<usize> {
    let requests = read_requests(file)?;
    info!(transactions = requests.len(), file = %file.display(), "📥 Replaying transactions");

    let node = FedlNode::open(config).await?;
    let summary = node.replay(&requests).await?;

    let mut lines = String::new();
    for response in &summary.responses {
        lines.push_str(&serde_json::to_string(response)?);
        lines.push('\n');
    }
    match output {
        Some(path) => std::fs::write(path, lines)
            .with_context(|| format!("writing responses {}", path.display()))?,
        None => print!("{}", lines),
    }

    if persist {
        node.persist().await?;
    }
    Ok(summary.rejected)
}

/// Print a summary of the persisted ledger
pub async fn run_inspect(config: NodeConfig) -> Result<()> {
    let snapshot_file = config.snapshot_file();
    if !snapshot_file.exists() {
        anyhow::bail!("no snapshot at {}", snapshot_file.display());
    }
    let node = FedlNode::open(config).await?;
    let report = node.inspect().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
