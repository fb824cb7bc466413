use crate::error::Result;
use async_trait::async_trait;

/// A single mutation applied by [`StorageBackend::write_batch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Put { key: String, value: Vec<u8> },
    Delete { key: String },
}

impl WriteOp {
    pub fn key(&self) -> &str {
        match self {
            WriteOp::Put { key, .. } | WriteOp::Delete { key } => key,
        }
    }
}

/// Trait for ordered key-value storage implementations
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Retrieve a value by key
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Check if a key exists
    async fn contains(&self, key: &str) -> Result<bool>;

    /// All entries whose key starts with `prefix`, in ascending key order
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, Vec<u8>)>>;

    /// Apply every operation or none of them
    async fn write_batch(&self, ops: Vec<WriteOp>) -> Result<()>;

    /// Get storage statistics
    async fn get_stats(&self) -> Result<StorageStats>;
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub entry_count: usize,
    pub index_entry_count: usize,
    pub total_size_bytes: u64,
    pub committed_batches: u64,
}
