//! Durable storage interface for the sync checkpoint.
//!
//! Only the accepted checkpoint hash is persisted. Pending and rejected
//! checkpoints are in-memory state and are rebuilt from the network.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::error::StorageError;
use crate::types::Hash256;

/// Persists the hash of the accepted sync checkpoint.
pub trait CheckpointStore: Send + Sync {
    /// Previously stored checkpoint, or `None` on a fresh database.
    fn read_sync_checkpoint(&self) -> Result<Option<Hash256>, StorageError>;

    /// Replace the stored checkpoint atomically.
    fn write_sync_checkpoint(&self, hash: &Hash256) -> Result<(), StorageError>;
}

/// In-memory [`CheckpointStore`] with write failure injection for tests.
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    value: Mutex<Option<Hash256>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that already holds `hash`, as after a restart.
    pub fn with_value(hash: Hash256) -> Self {
        let store = Self::default();
        *store.value.lock() = Some(hash);
        store
    }

    /// Number of successful writes so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make subsequent writes fail (or succeed again).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn read_sync_checkpoint(&self) -> Result<Option<Hash256>, StorageError> {
        Ok(*self.value.lock())
    }

    fn write_sync_checkpoint(&self, hash: &Hash256) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Backend("injected write failure".into()));
        }
        *self.value.lock() = Some(*hash);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
