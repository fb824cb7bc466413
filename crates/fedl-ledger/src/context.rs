use crate::backend::{StorageBackend, WriteOp};
use crate::composite::{build_composite_key, build_prefix, is_composite_key, split_composite_key};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use fedl_types::OrgId;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Value stored under an index entry. Index entries carry no payload.
const INDEX_MARKER: &[u8] = &[0];

/// Event attached to a transaction, published by the ledger after commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEvent {
    pub name: String,
    pub payload: Vec<u8>,
}

/// Accessor handed to transaction logic.
///
/// One instance covers exactly one transaction. Implementations must be
/// deterministic: the same sequence of calls against the same committed state
/// yields the same results on every replica.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Value stored under `key`, or [`LedgerError::NotFound`]
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;

    /// Insert the entry `index` / `attributes`
    async fn create_index_entry(&mut self, index: &str, attributes: &[&str]) -> Result<()>;

    /// Entity keys (last attribute) of every entry of `index` starting with `prefix`
    async fn scan_index(&self, index: &str, prefix: &[&str]) -> Result<Vec<String>>;

    /// Move an entry from `old` to `new` attributes as one operation.
    /// Fails with [`LedgerError::IndexEntryMissing`] when `old` is absent.
    async fn update_index_entry(&mut self, index: &str, old: &[&str], new: &[&str]) -> Result<()>;

    /// Organization that submitted the transaction
    fn tx_creator(&self) -> &OrgId;

    /// Transaction identifier assigned by the ordering layer
    fn tx_id(&self) -> &str;

    fn set_event(&mut self, name: &str, payload: Vec<u8>);
}

/// Buffered transaction over a [`StorageBackend`].
///
/// Reads observe the transaction's own writes. Nothing reaches the backend
/// until [`TxContext::commit`]; dropping the context abandons the transaction.
pub struct TxContext {
    backend: Arc<dyn StorageBackend>,
    creator: OrgId,
    tx_id: String,
    writes: BTreeMap<String, Option<Vec<u8>>>,
    events: Vec<LedgerEvent>,
}

impl TxContext {
    pub fn new(backend: Arc<dyn StorageBackend>, creator: OrgId, tx_id: impl Into<String>) -> Self {
        Self {
            backend,
            creator,
            tx_id: tx_id.into(),
            writes: BTreeMap::new(),
            events: Vec::new(),
        }
    }

    /// Number of buffered mutations
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    /// Apply every buffered write in one batch and return the transaction events
    pub async fn commit(self) -> Result<Vec<LedgerEvent>> {
        let ops: Vec<WriteOp> = self
            .writes
            .into_iter()
            .map(|(key, value)| match value {
                Some(value) => WriteOp::Put { key, value },
                None => WriteOp::Delete { key },
            })
            .collect();

        let op_count = ops.len();
        self.backend.write_batch(ops).await?;

        info!(
            tx_id = %self.tx_id,
            creator = %self.creator,
            writes = op_count,
            events = self.events.len(),
            "📝 Transaction committed"
        );

        Ok(self.events)
    }

    async fn lookup(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.writes.get(key) {
            Some(buffered) => Ok(buffered.clone()),
            None => self.backend.get(key).await,
        }
    }

    fn validate_plain_key(key: &str) -> Result<()> {
        if key.is_empty() {
            return Err(LedgerError::InvalidKey("key must not be empty".to_string()));
        }
        if is_composite_key(key) {
            return Err(LedgerError::InvalidKey(format!(
                "{:?} collides with the index key space",
                key
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Ledger for TxContext {
    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.lookup(key)
            .await?
            .ok_or_else(|| LedgerError::NotFound(key.to_string()))
    }

    async fn put(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        Self::validate_plain_key(key)?;
        self.writes.insert(key.to_string(), Some(value));
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.lookup(key).await?.is_some())
    }

    async fn create_index_entry(&mut self, index: &str, attributes: &[&str]) -> Result<()> {
        let key = build_composite_key(index, attributes)?;
        debug!(index, attributes = ?attributes, "Index entry created");
        self.writes.insert(key, Some(INDEX_MARKER.to_vec()));
        Ok(())
    }

    async fn scan_index(&self, index: &str, prefix: &[&str]) -> Result<Vec<String>> {
        let scan_prefix = build_prefix(index, prefix)?;

        let mut keys: BTreeMap<String, ()> = self
            .backend
            .scan_prefix(&scan_prefix)
            .await?
            .into_iter()
            .map(|(k, _)| (k, ()))
            .collect();

        for (key, value) in self
            .writes
            .range(scan_prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&scan_prefix))
        {
            match value {
                Some(_) => {
                    keys.insert(key.clone(), ());
                }
                None => {
                    keys.remove(key);
                }
            }
        }

        keys.into_keys()
            .map(|key| {
                split_composite_key(&key)
                    .and_then(|(_, mut attributes)| attributes.pop())
                    .ok_or_else(|| LedgerError::InvalidKey(format!("malformed index entry {:?}", key)))
            })
            .collect()
    }

    async fn update_index_entry(&mut self, index: &str, old: &[&str], new: &[&str]) -> Result<()> {
        let old_key = build_composite_key(index, old)?;
        let new_key = build_composite_key(index, new)?;

        if self.lookup(&old_key).await?.is_none() {
            return Err(LedgerError::IndexEntryMissing(format!(
                "{} {:?}",
                index, old
            )));
        }
        if old_key == new_key {
            return Ok(());
        }

        self.writes.insert(old_key, None);
        self.writes.insert(new_key, Some(INDEX_MARKER.to_vec()));
        debug!(index, old = ?old, new = ?new, "Index entry moved");
        Ok(())
    }

    fn tx_creator(&self) -> &OrgId {
        &self.creator
    }

    fn tx_id(&self) -> &str {
        &self.tx_id
    }

    fn set_event(&mut self, name: &str, payload: Vec<u8>) {
        self.events.push(LedgerEvent {
            name: name.to_string(),
            payload,
        });
    }
}
