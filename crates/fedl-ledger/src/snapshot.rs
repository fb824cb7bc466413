use crate::backend::{StorageBackend, WriteOp};
use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::info;

/// Snapshot metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    pub version: u32,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub entry_count: usize,
    /// Hex blake3 digest over every key and value, in key order
    pub state_hash: String,
}

/// Full copy of a backend's key space.
///
/// Two ledgers hold the same state exactly when their snapshots have the same
/// `state_hash`, which is what replay checks and tests compare.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub metadata: SnapshotMetadata,
    /// Values hex encoded so the file stays plain JSON
    pub entries: BTreeMap<String, String>,
}

impl Snapshot {
    /// Create a new snapshot from current state
    pub async fn create(backend: &dyn StorageBackend) -> Result<Self> {
        let entries: BTreeMap<String, Vec<u8>> = backend.scan_prefix("").await?.into_iter().collect();
        let state_hash = Self::calculate_hash(&entries);

        Ok(Self {
            metadata: SnapshotMetadata {
                version: 1,
                created_at: chrono::Utc::now(),
                entry_count: entries.len(),
                state_hash,
            },
            entries: entries
                .into_iter()
                .map(|(k, v)| (k, hex::encode(v)))
                .collect(),
        })
    }

    /// Digest of the current backend state without building a snapshot
    pub async fn state_hash(backend: &dyn StorageBackend) -> Result<String> {
        let entries: BTreeMap<String, Vec<u8>> = backend.scan_prefix("").await?.into_iter().collect();
        Ok(Self::calculate_hash(&entries))
    }

    /// Write every entry into `backend` as a single batch
    pub async fn restore(&self, backend: &dyn StorageBackend) -> Result<()> {
        let ops = self
            .decoded_entries()?
            .into_iter()
            .map(|(key, value)| WriteOp::Put { key, value })
            .collect();
        backend.write_batch(ops).await?;

        info!(
            entries = self.metadata.entry_count,
            state_hash = %self.metadata.state_hash,
            "🔄 Snapshot restored"
        );
        Ok(())
    }

    /// Verify snapshot integrity
    pub fn verify(&self) -> bool {
        match self.decoded_entries() {
            Ok(entries) => {
                entries.len() == self.metadata.entry_count
                    && Self::calculate_hash(&entries) == self.metadata.state_hash
            }
            Err(_) => false,
        }
    }

    /// Save snapshot to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec_pretty(self)?;
        let mut file = fs::File::create(path).await?;
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }

    /// Load snapshot from file
    pub async fn load_from_file(path: &Path) -> Result<Self> {
        let mut file = fs::File::open(path).await?;
        let mut data = Vec::new();
        file.read_to_end(&mut data).await?;

        let snapshot: Self = serde_json::from_slice(&data)?;
        if !snapshot.verify() {
            return Err(LedgerError::Backend("Snapshot verification failed".into()));
        }
        Ok(snapshot)
    }

    fn decoded_entries(&self) -> Result<BTreeMap<String, Vec<u8>>> {
        self.entries
            .iter()
            .map(|(k, v)| {
                hex::decode(v)
                    .map(|bytes| (k.clone(), bytes))
                    .map_err(|e| LedgerError::Serialization(format!("entry {:?}: {}", k, e)))
            })
            .collect()
    }

    fn calculate_hash(entries: &BTreeMap<String, Vec<u8>>) -> String {
        let mut hasher = blake3::Hasher::new();
        for (key, value) in entries {
            hasher.update(&(key.len() as u64).to_le_bytes());
            hasher.update(key.as_bytes());
            hasher.update(&(value.len() as u64).to_le_bytes());
            hasher.update(value);
        }
        hasher.finalize().to_hex().to_string()
    }
}
