use crate::config::NodeConfig;
use crate::dispatch::{dispatch, TxRequest, TxResponse};
use anyhow::{Context, Result};
use fedl_ledger::{MemoryBackend, Snapshot, StorageBackend, TxContext};
use fedl_registry::store::asset_type_of;
use fedl_registry::{PlanStatus, Registry, RegistryError};
use fedl_types::{content_key, OrgId, KEY_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Registry bound to a local ledger whose state persists as a snapshot file
pub struct FedlNode {
    config: NodeConfig,
    backend: Arc<MemoryBackend>,
    registry: Registry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplaySummary {
    pub committed: usize,
    pub rejected: usize,
    pub state_hash: String,
    pub responses: Vec<TxResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub key: String,
    pub owner: OrgId,
    pub status: PlanStatus,
    pub done_count: u32,
    pub tuple_count: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InspectReport {
    pub state_hash: String,
    pub entries: usize,
    pub index_entries: usize,
    pub assets: BTreeMap<String, usize>,
    pub compute_plans: Vec<PlanSummary>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TxSeed<'a> {
    base_state: &'a str,
    position: usize,
    request: &'a TxRequest,
}

/// Parse a replay file: a JSON array of requests, or one request per line.
///
/// In the line format blank lines and lines starting with `#` are skipped.
pub fn parse_requests(content: &str) -> Result<Vec<TxRequest>> {
    if content.trim_start().starts_with('[') {
        return serde_json::from_str(content).context("parsing request array");
    }
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| {
            let line = line.trim();
            !line.is_empty() && !line.starts_with('#')
        })
        .map(|(n, line)| {
            serde_json::from_str(line).with_context(|| format!("parsing request on line {}", n + 1))
        })
        .collect()
}

impl FedlNode {
    /// Open the node, restoring the snapshot file when one exists
    pub async fn open(config: NodeConfig) -> Result<Self> {
        config.validate()?;
        let registry = Registry::new(config.registry.clone())
            .map_err(|e| anyhow::anyhow!("invalid registry config: {}", e))?;
        let backend = Arc::new(MemoryBackend::new());

        let snapshot_file = config.snapshot_file();
        if snapshot_file.exists() {
            let snapshot = Snapshot::load_from_file(&snapshot_file)
                .await
                .with_context(|| format!("loading snapshot {}", snapshot_file.display()))?;
            snapshot.restore(backend.as_ref()).await?;
        } else {
            debug!(path = %snapshot_file.display(), "No snapshot, starting from an empty ledger");
        }

        info!(
            name = %config.node.name,
            data_dir = %config.node.data_dir.display(),
            "🚀 Node opened"
        );
        Ok(Self {
            config,
            backend,
            registry,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn backend(&self) -> &Arc<MemoryBackend> {
        &self.backend
    }

    pub async fn state_hash(&self) -> Result<String> {
        Ok(Snapshot::state_hash(self.backend.as_ref()).await?)
    }

    /// Run one transaction: commit on success, discard everything on error
    pub async fn submit(&self, request: &TxRequest, default_tx_id: String) -> TxResponse {
        let tx_id = request.tx_id.clone().unwrap_or(default_tx_id);
        let function = request.function.as_str();

        let creator = match OrgId::new(request.creator.as_str()) {
            Ok(creator) => creator,
            Err(e) => return TxResponse::rejected(tx_id, function, &RegistryError::from(e)),
        };

        let mut tx = TxContext::new(self.backend.clone(), creator, tx_id.clone());
        let outcome = dispatch(&self.registry, &mut tx, function, request.args.clone()).await;
        match outcome {
            Ok(payload) => match tx.commit().await {
                Ok(events) => TxResponse::committed(tx_id, function, payload, events),
                Err(e) => TxResponse::rejected(tx_id, function, &RegistryError::from(e)),
            },
            Err(err) => {
                warn!(
                    tx_id = %tx_id,
                    function,
                    creator = %request.creator,
                    status = err.kind().status_code(),
                    error = %err,
                    "Transaction rejected"
                );
                TxResponse::rejected(tx_id, function, &err)
            }
        }
    }

    /// Apply `requests` in order. Rejected transactions leave no trace.
    pub async fn replay(&self, requests: &[TxRequest]) -> Result<ReplaySummary> {
        let base_state = self.state_hash().await?;
        let mut responses = Vec::with_capacity(requests.len());

        for (position, request) in requests.iter().enumerate() {
            let default_tx_id = content_key(&TxSeed {
                base_state: &base_state,
                position,
                request,
            })?;
            responses.push(self.submit(request, default_tx_id).await);
        }

        let committed = responses.iter().filter(|r| r.is_committed()).count();
        let summary = ReplaySummary {
            committed,
            rejected: responses.len() - committed,
            state_hash: self.state_hash().await?,
            responses,
        };
        info!(
            committed = summary.committed,
            rejected = summary.rejected,
            state_hash = %summary.state_hash,
            "📜 Replay finished"
        );
        Ok(summary)
    }

    /// Write the ledger state to the snapshot file
    pub async fn persist(&self) -> Result<PathBuf> {
        let path = self.config.snapshot_file();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        let snapshot = Snapshot::create(self.backend.as_ref()).await?;
        snapshot
            .save_to_file(&path)
            .await
            .with_context(|| format!("writing snapshot {}", path.display()))?;
        info!(
            path = %path.display(),
            entries = snapshot.metadata.entry_count,
            state_hash = %snapshot.metadata.state_hash,
            "💾 Snapshot saved"
        );
        Ok(path)
    }

    /// Count records per asset type and summarize compute plans
    pub async fn inspect(&self) -> Result<InspectReport> {
        let entries = self.backend.scan_prefix("").await?;
        let reader = TxContext::new(self.backend.clone(), OrgId::from("inspector"), "inspect");

        let mut assets: BTreeMap<String, usize> = BTreeMap::new();
        let mut index_entries = 0;
        for (key, _) in &entries {
            if key.contains(KEY_SEPARATOR) {
                index_entries += 1;
                continue;
            }
            if let Some(asset_type) = asset_type_of(&reader, key).await? {
                *assets.entry(asset_type.as_str().to_string()).or_default() += 1;
            }
        }

        let compute_plans = self
            .registry
            .query_compute_plans(&reader)
            .await?
            .into_iter()
            .map(|plan| PlanSummary {
                key: plan.key,
                owner: plan.owner,
                status: plan.status,
                done_count: plan.done_count,
                tuple_count: plan.tuple_count,
            })
            .collect();

        Ok(InspectReport {
            state_hash: self.state_hash().await?,
            entries: entries.len(),
            index_entries,
            assets,
            compute_plans,
        })
    }
}

/// Read and parse a replay file
pub fn read_requests(path: &Path) -> Result<Vec<TxRequest>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading transactions {}", path.display()))?;
    parse_requests(&content).with_context(|| format!("in {}", path.display()))
}
