//! Block index interface and in-memory implementation.
//!
//! The checkpoint subsystem never owns block index nodes. It reaches them
//! through [`ChainIndex`], a read-only capability keyed by opaque
//! [`BlockHandle`]s, and asks the chain owner to reorganize through
//! [`ChainPromoter`]. The [`MemoryChainIndex`] backs tests and the node's
//! header index.
//!
//! Handles are only meaningful to the index that issued them. A handle may
//! outlive the entry it names; every accessor therefore returns `Option`.

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::error::ChainError;
use crate::types::Hash256;

/// Opaque reference to an entry of a [`ChainIndex`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockHandle(pub usize);

/// Index record of a single block header.
#[derive(Clone, Copy, Debug, PartialEq, Eq, bincode::Encode, bincode::Decode)]
pub struct IndexEntry {
    /// Block header hash.
    pub hash: Hash256,
    /// Hash of the previous block; zero for genesis.
    pub prev_hash: Hash256,
    /// Height above genesis.
    pub height: u32,
    /// Block timestamp (Unix seconds).
    pub timestamp: u32,
}

/// Read-only view of the block index.
///
/// Implemented by whatever owns block headers. Callers must tolerate a
/// handle going stale as soon as they stop holding their own locks.
pub trait ChainIndex: Send + Sync {
    /// Resolve a block hash to a handle.
    fn lookup(&self, hash: &Hash256) -> Option<BlockHandle>;

    /// Header record for a handle.
    fn entry(&self, handle: BlockHandle) -> Option<IndexEntry>;

    /// Previous block. `None` for genesis or a broken link.
    fn parent(&self, handle: BlockHandle) -> Option<BlockHandle>;

    /// Whether the block is part of the current best chain.
    fn is_on_main_chain(&self, handle: BlockHandle) -> bool;

    /// Tip of the current best chain.
    fn best_tip(&self) -> BlockHandle;

    /// Hash of the genesis block.
    fn genesis_hash(&self) -> Hash256;

    /// If `hash` is an orphan (its ancestry is not connected yet), the hash
    /// of the missing block that would connect it.
    fn orphan_wanted(&self, _hash: &Hash256) -> Option<Hash256> {
        None
    }

    /// Whether the block is present in the index.
    fn contains(&self, hash: &Hash256) -> bool {
        self.lookup(hash).is_some()
    }

    fn height(&self, handle: BlockHandle) -> Option<u32> {
        self.entry(handle).map(|e| e.height)
    }

    fn hash(&self, handle: BlockHandle) -> Option<Hash256> {
        self.entry(handle).map(|e| e.hash)
    }

    /// Walk previous-block links from `handle` down to `height`.
    ///
    /// Returns `None` if the walk falls off the chain or skips the target
    /// height, both of which mean the index is damaged.
    fn ancestor(&self, handle: BlockHandle, height: u32) -> Option<BlockHandle> {
        let mut current = handle;
        loop {
            let entry = self.entry(current)?;
            if entry.height == height {
                return Some(current);
            }
            if entry.height < height {
                return None;
            }
            current = self.parent(current)?;
        }
    }

    /// Block locator starting at `handle`: about ten consecutive hashes, then
    /// exponentially sparser ones, always ending at genesis.
    fn locator(&self, handle: BlockHandle) -> Vec<Hash256> {
        let mut hashes = Vec::new();
        let Some(mut height) = self.height(handle) else {
            return hashes;
        };
        let mut step = 1u32;
        let mut current = handle;
        loop {
            let Some(hash) = self.hash(current) else {
                break;
            };
            hashes.push(hash);
            if height == 0 {
                break;
            }
            let target = height.saturating_sub(step);
            match self.ancestor(current, target) {
                Some(next) => {
                    current = next;
                    height = target;
                }
                None => break,
            }
            if hashes.len() >= 10 {
                step = step.saturating_mul(2);
            }
        }
        let genesis = self.genesis_hash();
        if hashes.last() != Some(&genesis) {
            hashes.push(genesis);
        }
        hashes
    }
}

/// Write side of the chain owner, used to make a checkpointed block part of
/// the best chain.
///
/// Implementations must not call back into the checkpoint subsystem; the
/// caller holds the sync-checkpoint lock for the duration of the call.
pub trait ChainPromoter: Send + Sync {
    fn promote(&self, handle: BlockHandle) -> Result<(), ChainError>;
}

#[derive(Debug)]
struct Slot {
    entry: IndexEntry,
    parent: Option<BlockHandle>,
}

#[derive(Debug)]
struct IndexInner {
    slots: Vec<Slot>,
    by_hash: HashMap<Hash256, BlockHandle>,
    /// Best chain by height.
    main_chain: Vec<BlockHandle>,
    /// Orphan block hash -> its previous-block hash.
    orphans: HashMap<Hash256, Hash256>,
}

/// In-memory block index.
///
/// Entries are append-only, so handles stay valid for the life of the index.
/// The best chain only changes through [`set_best_chain`](Self::set_best_chain)
/// (or [`ChainPromoter::promote`]).
#[derive(Debug)]
pub struct MemoryChainIndex {
    inner: RwLock<IndexInner>,
}

impl MemoryChainIndex {
    /// Create an index holding only the genesis block.
    pub fn new(genesis_hash: Hash256, genesis_time: u32) -> Self {
        let genesis = Slot {
            entry: IndexEntry {
                hash: genesis_hash,
                prev_hash: Hash256::ZERO,
                height: 0,
                timestamp: genesis_time,
            },
            parent: None,
        };
        let mut by_hash = HashMap::new();
        by_hash.insert(genesis_hash, BlockHandle(0));
        Self {
            inner: RwLock::new(IndexInner {
                slots: vec![genesis],
                by_hash,
                main_chain: vec![BlockHandle(0)],
                orphans: HashMap::new(),
            }),
        }
    }

    /// Add a block whose parent is already indexed.
    ///
    /// The best chain is left untouched.
    pub fn insert(
        &self,
        hash: Hash256,
        prev_hash: Hash256,
        timestamp: u32,
    ) -> Result<BlockHandle, ChainError> {
        let mut inner = self.inner.write();
        if inner.by_hash.contains_key(&hash) {
            return Err(ChainError::DuplicateBlock(hash));
        }
        let parent = *inner
            .by_hash
            .get(&prev_hash)
            .ok_or(ChainError::UnknownParent { hash, parent: prev_hash })?;
        let height = inner.slots[parent.0].entry.height + 1;
        let handle = BlockHandle(inner.slots.len());
        inner.slots.push(Slot {
            entry: IndexEntry {
                hash,
                prev_hash,
                height,
                timestamp,
            },
            parent: Some(parent),
        });
        inner.by_hash.insert(hash, handle);
        inner.orphans.remove(&hash);
        Ok(handle)
    }

    /// Make `handle` the best tip, rebuilding main-chain membership.
    pub fn set_best_chain(&self, handle: BlockHandle) -> Result<(), ChainError> {
        let mut inner = self.inner.write();
        let tip = inner.slots.get(handle.0).ok_or(ChainError::StaleHandle)?;
        let mut chain = vec![handle; tip.entry.height as usize + 1];
        let mut current = tip.parent;
        while let Some(h) = current {
            let slot = &inner.slots[h.0];
            chain[slot.entry.height as usize] = h;
            current = slot.parent;
        }
        inner.main_chain = chain;
        Ok(())
    }

    /// Remember a block whose parent is not yet known.
    pub fn add_orphan(&self, hash: Hash256, prev_hash: Hash256) {
        self.inner.write().orphans.insert(hash, prev_hash);
    }

    /// Forget an orphan that will never connect.
    pub fn remove_orphan(&self, hash: &Hash256) {
        self.inner.write().orphans.remove(hash);
    }

    pub fn is_orphan(&self, hash: &Hash256) -> bool {
        self.inner.read().orphans.contains_key(hash)
    }

    /// Height of the best tip.
    pub fn best_height(&self) -> u32 {
        let inner = self.inner.read();
        (inner.main_chain.len() - 1) as u32
    }

    /// Number of indexed blocks, genesis included.
    pub fn len(&self) -> usize {
        self.inner.read().slots.len()
    }

    /// Always false: the genesis block is indexed from construction.
    pub fn is_empty(&self) -> bool {
        self.inner.read().slots.is_empty()
    }
}

impl ChainIndex for MemoryChainIndex {
    fn lookup(&self, hash: &Hash256) -> Option<BlockHandle> {
        self.inner.read().by_hash.get(hash).copied()
    }

    fn entry(&self, handle: BlockHandle) -> Option<IndexEntry> {
        self.inner.read().slots.get(handle.0).map(|s| s.entry)
    }

    fn parent(&self, handle: BlockHandle) -> Option<BlockHandle> {
        self.inner.read().slots.get(handle.0).and_then(|s| s.parent)
    }

    fn is_on_main_chain(&self, handle: BlockHandle) -> bool {
        let inner = self.inner.read();
        inner
            .slots
            .get(handle.0)
            .and_then(|s| inner.main_chain.get(s.entry.height as usize))
            == Some(&handle)
    }

    fn best_tip(&self) -> BlockHandle {
        let inner = self.inner.read();
        inner.main_chain.last().copied().unwrap_or(BlockHandle(0))
    }

    fn genesis_hash(&self) -> Hash256 {
        self.inner.read().slots[0].entry.hash
    }

    fn orphan_wanted(&self, hash: &Hash256) -> Option<Hash256> {
        let inner = self.inner.read();
        let mut wanted = *inner.orphans.get(hash)?;
        // Bounded by the orphan count so a cycle in bad data cannot spin.
        for _ in 0..inner.orphans.len() {
            match inner.orphans.get(&wanted) {
                Some(prev) => wanted = *prev,
                None => break,
            }
        }
        Some(wanted)
    }
}

impl ChainPromoter for MemoryChainIndex {
    fn promote(&self, handle: BlockHandle) -> Result<(), ChainError> {
        self.set_best_chain(handle)
    }
}
