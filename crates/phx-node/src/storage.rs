//! RocksDB-backed persistence for the header index and the sync checkpoint.
//!
//! Column families:
//!
//! - `metadata`: the sync checkpoint hash and the best tip hash;
//! - `block_index`: block hash -> bincode-encoded [`IndexEntry`].
//!
//! Every mutation goes through a [`WriteBatch`], so a crash never leaves a
//! half-written record.

use std::path::Path;

use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};

use phx_core::chain_index::IndexEntry;
use phx_core::error::StorageError;
use phx_core::store::CheckpointStore;
use phx_core::types::Hash256;

// --- Column family names ---

const CF_METADATA: &str = "metadata";
const CF_BLOCK_INDEX: &str = "block_index";

const ALL_CFS: &[&str] = &[CF_METADATA, CF_BLOCK_INDEX];

// --- Metadata keys ---

const META_SYNC_CHECKPOINT: &[u8] = b"sync_checkpoint";
const META_BEST_TIP: &[u8] = b"best_tip";

pub struct RocksStore {
    db: DB,
}

impl RocksStore {
    /// Open or create a database at `path`, creating missing column
    /// families.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&db_opts, path.as_ref(), cf_descriptors)
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self { db })
    }

    /// Store a header index entry, optionally moving the best tip to it in
    /// the same batch.
    pub fn put_index_entry(&self, entry: &IndexEntry, best_tip: bool) -> Result<(), StorageError> {
        let cf_index = self.cf_handle(CF_BLOCK_INDEX)?;
        let encoded = bincode::encode_to_vec(entry, bincode::config::standard())
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let mut batch = WriteBatch::default();
        batch.put_cf(cf_index, entry.hash.as_bytes(), encoded);
        if best_tip {
            let cf_meta = self.cf_handle(CF_METADATA)?;
            batch.put_cf(cf_meta, META_BEST_TIP, entry.hash.as_bytes());
        }
        self.write(batch)
    }

    /// All stored index entries, ordered by height.
    pub fn load_block_index(&self) -> Result<Vec<IndexEntry>, StorageError> {
        let cf = self.cf_handle(CF_BLOCK_INDEX)?;
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(&cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item.map_err(|e| StorageError::Backend(e.to_string()))?;
            let (entry, _): (IndexEntry, usize) =
                bincode::decode_from_slice(&value, bincode::config::standard())
                    .map_err(|e| StorageError::Corrupt(e.to_string()))?;
            entries.push(entry);
        }
        entries.sort_by_key(|e| e.height);
        Ok(entries)
    }

    pub fn read_best_tip(&self) -> Result<Option<Hash256>, StorageError> {
        self.get_meta_hash(META_BEST_TIP)
    }

    pub fn write_best_tip(&self, hash: &Hash256) -> Result<(), StorageError> {
        self.put_meta_hash(META_BEST_TIP, hash)
    }

    /// Flush memtables to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        for name in ALL_CFS {
            let cf = self.cf_handle(name)?;
            self.db
                .flush_cf(&cf)
                .map_err(|e| StorageError::Backend(e.to_string()))?;
        }
        Ok(())
    }

    // --- Internal helpers ---

    fn get_meta_hash(&self, key: &[u8]) -> Result<Option<Hash256>, StorageError> {
        let cf = self.cf_handle(CF_METADATA)?;
        match self
            .db
            .get_cf(&cf, key)
            .map_err(|e| StorageError::Backend(e.to_string()))?
        {
            Some(bytes) => {
                let arr: [u8; 32] = bytes.as_slice().try_into().map_err(|_| {
                    StorageError::Corrupt(format!(
                        "{}: expected 32 bytes, got {}",
                        String::from_utf8_lossy(key),
                        bytes.len()
                    ))
                })?;
                Ok(Some(Hash256(arr)))
            }
            None => Ok(None),
        }
    }

    fn put_meta_hash(&self, key: &[u8], hash: &Hash256) -> Result<(), StorageError> {
        let cf = self.cf_handle(CF_METADATA)?;
        let mut batch = WriteBatch::default();
        batch.put_cf(cf, key, hash.as_bytes());
        self.write(batch)
    }

    fn write(&self, batch: WriteBatch) -> Result<(), StorageError> {
        self.db
            .write(batch)
            .map_err(|e| StorageError::Backend(e.to_string()))
    }

    fn cf_handle(&self, name: &str) -> Result<&rocksdb::ColumnFamily, StorageError> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StorageError::MissingColumnFamily(name.to_string()))
    }
}

impl CheckpointStore for RocksStore {
    fn read_sync_checkpoint(&self) -> Result<Option<Hash256>, StorageError> {
        self.get_meta_hash(META_SYNC_CHECKPOINT)
    }

    fn write_sync_checkpoint(&self, hash: &Hash256) -> Result<(), StorageError> {
        self.put_meta_hash(META_SYNC_CHECKPOINT, hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(n: u8, height: u32) -> IndexEntry {
        IndexEntry {
            hash: Hash256([n; 32]),
            prev_hash: Hash256([n.wrapping_sub(1); 32]),
            height,
            timestamp: 1_000 + height,
        }
    }

    #[test]
    fn fresh_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        assert_eq!(store.read_sync_checkpoint().unwrap(), None);
        assert_eq!(store.read_best_tip().unwrap(), None);
        assert!(store.load_block_index().unwrap().is_empty());
    }

    #[test]
    fn index_entries_load_in_height_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        // Hash order differs from height order.
        store.put_index_entry(&entry(0x30, 1), false).unwrap();
        store.put_index_entry(&entry(0x10, 3), true).unwrap();
        store.put_index_entry(&entry(0x20, 2), false).unwrap();

        let heights: Vec<u32> = store.load_block_index().unwrap().iter().map(|e| e.height).collect();
        assert_eq!(heights, vec![1, 2, 3]);
        assert_eq!(store.read_best_tip().unwrap(), Some(Hash256([0x10; 32])));
    }
}
