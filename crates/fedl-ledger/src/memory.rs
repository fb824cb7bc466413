use crate::backend::{StorageBackend, StorageStats, WriteOp};
use crate::composite::is_composite_key;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// In-memory storage backend for testing and single-process deployments
#[derive(Clone)]
pub struct MemoryBackend {
    entries: Arc<RwLock<BTreeMap<String, Vec<u8>>>>,
    committed_batches: Arc<RwLock<u64>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(BTreeMap::new())),
            committed_batches: Arc::new(RwLock::new(0)),
        }
    }

    /// Copy of every entry, used by snapshots and by tests comparing ledger states
    pub async fn dump(&self) -> BTreeMap<String, Vec<u8>> {
        self.entries.read().await.clone()
    }

    /// Replace the whole content
    pub async fn load(&self, entries: BTreeMap<String, Vec<u8>>) {
        *self.entries.write().await = entries;
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    async fn contains(&self, key: &str) -> Result<bool> {
        let entries = self.entries.read().await;
        Ok(entries.contains_key(key))
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>> {
        let entries = self.entries.read().await;
        Ok(entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    async fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()> {
        // Single write guard: readers observe the batch entirely or not at all
        let mut entries = self.entries.write().await;
        for op in ops {
            match op {
                WriteOp::Put { key, value } => {
                    entries.insert(key, value);
                }
                WriteOp::Delete { key } => {
                    entries.remove(&key);
                }
            }
        }
        drop(entries);

        *self.committed_batches.write().await += 1;
        Ok(())
    }

    async fn get_stats(&self) -> Result<StorageStats> {
        let entries = self.entries.read().await;
        let index_entry_count = entries.keys().filter(|k| is_composite_key(k)).count();

        Ok(StorageStats {
            entry_count: entries.len() - index_entry_count,
            index_entry_count,
            total_size_bytes: entries
                .iter()
                .map(|(k, v)| (k.len() + v.len()) as u64)
                .sum(),
            committed_batches: *self.committed_batches.read().await,
        })
    }
}
