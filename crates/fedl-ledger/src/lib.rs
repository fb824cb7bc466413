//! Ledger accessor for the fedl task registry.
//!
//! The registry never talks to storage directly. It receives a [`Ledger`]
//! for the duration of one transaction: plain get/put/exists by key plus
//! composite-key secondary indices. [`TxContext`] is the production
//! implementation, buffering every write until [`TxContext::commit`] applies
//! them atomically to a [`StorageBackend`].

pub mod backend;
pub mod composite;
pub mod context;
pub mod error;
pub mod memory;
pub mod snapshot;

pub use backend::{StorageBackend, StorageStats, WriteOp};
pub use composite::{build_composite_key, build_prefix, split_composite_key};
pub use context::{Ledger, LedgerEvent, TxContext};
pub use error::{LedgerError, Result};
pub use memory::MemoryBackend;
pub use snapshot::{Snapshot, SnapshotMetadata};
