//! Full node composition and event loop.
//!
//! The [`Node`] owns the header index, the RocksDB store, the sync
//! checkpoint manager, and (optionally) the P2P network. Block headers enter
//! through [`Node::accept_block_header`], which applies the hardened and
//! synchronized checkpoint rules before indexing. Checkpoint messages from
//! peers are fed to the manager from the event loop in [`Node::run`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use phx_checkpoint::error::ProcessError;
use phx_checkpoint::relay::{CheckpointPeer, NoPeers, PeerDirectory};
use phx_checkpoint::{
    CheckpointInfo, CheckpointRegistry, CheckpointServices, ProcessOutcome, SignatureAuthority,
    SignedCheckpoint, SyncCheckpointManager,
};
use phx_core::chain_index::{BlockHandle, ChainIndex, ChainPromoter, IndexEntry, MemoryChainIndex};
use phx_core::error::ChainError;
use phx_core::store::CheckpointStore;
use phx_core::types::Hash256;
use phx_network::{NetworkMessage, NetworkNode, Peer, PeerEvent};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::storage::RocksStore;

/// Result of offering a block header to the node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderOutcome {
    /// Indexed at `height`; `best` if it became the new best tip.
    Connected { height: u32, best: bool },
    /// Parent unknown; held until the parent arrives.
    Orphan,
}

#[derive(Debug, Clone, Copy)]
struct OrphanHeader {
    prev_hash: Hash256,
    timestamp: u32,
}

/// Moves the best chain of the header index and records the new tip.
struct IndexPromoter {
    index: Arc<MemoryChainIndex>,
    storage: Arc<RocksStore>,
}

impl ChainPromoter for IndexPromoter {
    fn promote(&self, handle: BlockHandle) -> Result<(), ChainError> {
        let hash = self.index.hash(handle).ok_or(ChainError::StaleHandle)?;
        self.storage
            .write_best_tip(&hash)
            .map_err(|e| ChainError::ReorgFailed(e.to_string()))?;
        self.index.set_best_chain(handle)
    }
}

/// Build the checkpoint authority for the configured network, installing
/// the master key if one is configured.
pub fn authority_from_config(config: &NodeConfig) -> Result<SignatureAuthority, NodeError> {
    let mut authority = SignatureAuthority::for_network(config.network_type())?;
    if let Some(key) = &config.checkpoint_key {
        authority.set_master_key(key.expose())?;
        info!("checkpoint master key installed");
    }
    Ok(authority)
}

/// The full node.
pub struct Node {
    config: NodeConfig,
    storage: Arc<RocksStore>,
    index: Arc<MemoryChainIndex>,
    checkpoints: SyncCheckpointManager,
    /// Headers waiting for their parent. The lock is the chain lock: header
    /// acceptance and checkpoint adoption both run under it, always taken
    /// before the checkpoint state lock.
    orphans: Mutex<HashMap<Hash256, OrphanHeader>>,
    network: Option<NetworkNode>,
    event_rx: Option<tokio::sync::Mutex<mpsc::UnboundedReceiver<PeerEvent>>>,
}

impl Node {
    /// Create a node from `config` and start the P2P network.
    pub async fn new(config: NodeConfig) -> Result<Arc<Self>, NodeError> {
        let authority = authority_from_config(&config)?;
        Self::start(config, authority).await
    }

    /// Like [`new`](Self::new) with an explicit checkpoint authority.
    ///
    /// If the network fails to start the node runs without P2P.
    pub async fn start(config: NodeConfig, authority: SignatureAuthority) -> Result<Arc<Self>, NodeError> {
        let (network, event_rx) = match NetworkNode::start(config.network.clone()).await {
            Ok((net, rx)) => (Some(net), Some(tokio::sync::Mutex::new(rx))),
            Err(e) => {
                warn!("failed to start network: {e}; running without P2P");
                (None, None)
            }
        };
        let peers: Arc<dyn PeerDirectory> = match &network {
            Some(net) => net.peers(),
            None => Arc::new(NoPeers),
        };
        Self::assemble(config, authority, peers, network, event_rx)
    }

    /// Create a node without networking, using the configured authority.
    pub fn without_network(config: NodeConfig) -> Result<Arc<Self>, NodeError> {
        let authority = authority_from_config(&config)?;
        Self::offline(config, authority)
    }

    /// Create a node without networking and with an explicit authority.
    pub fn offline(config: NodeConfig, authority: SignatureAuthority) -> Result<Arc<Self>, NodeError> {
        Self::assemble(config, authority, Arc::new(NoPeers), None, None)
    }

    fn assemble(
        config: NodeConfig,
        authority: SignatureAuthority,
        peers: Arc<dyn PeerDirectory>,
        network: Option<NetworkNode>,
        event_rx: Option<tokio::sync::Mutex<mpsc::UnboundedReceiver<PeerEvent>>>,
    ) -> Result<Arc<Self>, NodeError> {
        let net = config.network_type();
        let storage = Arc::new(RocksStore::open(config.db_path())?);
        let index = Arc::new(MemoryChainIndex::new(net.genesis_hash(), net.genesis_time()));
        load_index(&index, &storage)?;

        let index_dyn: Arc<dyn ChainIndex> = index.clone();
        let store_dyn: Arc<dyn CheckpointStore> = storage.clone();
        let promoter: Arc<dyn ChainPromoter> = Arc::new(IndexPromoter {
            index: Arc::clone(&index),
            storage: Arc::clone(&storage),
        });
        let services = CheckpointServices {
            index: index_dyn,
            promoter,
            store: store_dyn,
            peers,
        };
        let checkpoints = SyncCheckpointManager::open(
            authority,
            CheckpointRegistry::for_network(net),
            config.checkpoint_policy,
            services,
        )?
        .with_checkpoint_depth(config.checkpoint_depth);

        info!(
            network = %net,
            height = index.best_height(),
            sync_checkpoint = %checkpoints.accepted_hash(),
            policy = %config.checkpoint_policy,
            "node initialized"
        );

        Ok(Arc::new(Self {
            config,
            storage,
            index,
            checkpoints,
            orphans: Mutex::new(HashMap::new()),
            network,
            event_rx,
        }))
    }

    /// Offer a block header to the node.
    ///
    /// Rejects headers that contradict a hardened checkpoint, fork below the
    /// last hardened checkpoint, or (under the strict policy) conflict with
    /// the sync checkpoint. Headers with an unknown parent are held as
    /// orphans and connected once the parent arrives. After indexing, a
    /// pending sync checkpoint is retried.
    pub fn accept_block_header(
        &self,
        hash: Hash256,
        prev_hash: Hash256,
        timestamp: u32,
    ) -> Result<HeaderOutcome, NodeError> {
        let mut orphans = self.orphans.lock();
        if self.index.contains(&hash) || orphans.contains_key(&hash) {
            return Err(ChainError::DuplicateBlock(hash).into());
        }
        let Some(parent) = self.index.lookup(&prev_hash) else {
            orphans.insert(hash, OrphanHeader { prev_hash, timestamp });
            self.index.add_orphan(hash, prev_hash);
            debug!(%hash, %prev_hash, "orphan header");
            return Ok(HeaderOutcome::Orphan);
        };

        let outcome = match self.connect_header(hash, prev_hash, timestamp, parent) {
            Ok(outcome) => outcome,
            Err(e) => {
                self.discard_descendants(&mut orphans, hash);
                return Err(e);
            }
        };

        let mut ready = vec![hash];
        while let Some(parent_hash) = ready.pop() {
            let children: Vec<Hash256> = orphans
                .iter()
                .filter(|(_, orphan)| orphan.prev_hash == parent_hash)
                .map(|(child, _)| *child)
                .collect();
            for child in children {
                let (Some(orphan), Some(parent)) = (orphans.remove(&child), self.index.lookup(&parent_hash))
                else {
                    continue;
                };
                match self.connect_header(child, orphan.prev_hash, orphan.timestamp, parent) {
                    Ok(_) => ready.push(child),
                    Err(e) => {
                        debug!(hash = %child, "dropping orphan header: {e}");
                        self.index.remove_orphan(&child);
                        self.discard_descendants(&mut orphans, child);
                    }
                }
            }
        }

        if let Err(e) = self.checkpoints.accept_pending() {
            debug!("pending checkpoint not accepted: {e}");
        }
        drop(orphans);
        Ok(outcome)
    }

    /// Drop every orphan descending from a header that failed to connect.
    fn discard_descendants(&self, orphans: &mut HashMap<Hash256, OrphanHeader>, root: Hash256) {
        let mut dead = vec![root];
        while let Some(parent_hash) = dead.pop() {
            let children: Vec<Hash256> = orphans
                .iter()
                .filter(|(_, orphan)| orphan.prev_hash == parent_hash)
                .map(|(child, _)| *child)
                .collect();
            for child in children {
                orphans.remove(&child);
                self.index.remove_orphan(&child);
                debug!(hash = %child, parent = %parent_hash, "discarding orphan of a rejected header");
                dead.push(child);
            }
        }
    }

    fn connect_header(
        &self,
        hash: Hash256,
        prev_hash: Hash256,
        timestamp: u32,
        parent: BlockHandle,
    ) -> Result<HeaderOutcome, NodeError> {
        let height = self
            .index
            .height(parent)
            .ok_or(ChainError::StaleHandle)?
            .checked_add(1)
            .ok_or_else(|| ChainError::ReorgFailed("height overflow".into()))?;

        let registry = self.checkpoints.registry();
        registry.check_hardened(height, &hash)?;
        if registry.is_below_last(height) {
            if let Some((_, last)) = registry.find_last_in_chain(&*self.index) {
                if height < last.height {
                    warn!(%hash, height, checkpoint = last.height, "fork below hardened checkpoint");
                    return Err(NodeError::BelowHardened { height });
                }
            }
        }

        if !self.checkpoints.check_block_against_sync(&hash, parent).admits() {
            return Err(NodeError::SyncConflict(hash));
        }

        let best = height > self.index.best_height();
        let entry = IndexEntry {
            hash,
            prev_hash,
            height,
            timestamp,
        };
        self.storage.put_index_entry(&entry, best)?;
        let handle = self.index.insert(hash, prev_hash, timestamp)?;
        if best {
            self.index.set_best_chain(handle)?;
            info!(height, %hash, "new best header");
        } else {
            debug!(height, %hash, "side-chain header");
        }
        Ok(HeaderOutcome::Connected { height, best })
    }

    /// Dispatch one network event.
    pub fn handle_event(&self, event: PeerEvent) {
        match event {
            PeerEvent::Connected(peer) => {
                info!(peer = %peer.addr(), "peer connected");
                let peer: &dyn CheckpointPeer = &*peer;
                self.checkpoints.announce_to(peer);
            }
            PeerEvent::Disconnected(addr) => {
                info!(peer = %addr, "peer disconnected");
            }
            PeerEvent::Message { peer, message } => self.handle_message(&peer, message),
        }
    }

    fn handle_message(&self, peer: &Arc<Peer>, message: NetworkMessage) {
        match message {
            NetworkMessage::Checkpoint(signed) => {
                let from: &dyn CheckpointPeer = &**peer;
                match self.process_checkpoint(&signed, Some(from)) {
                    Ok(ProcessOutcome::Adopted) => {
                        debug!(peer = %peer.addr(), "checkpoint from peer adopted");
                    }
                    Ok(ProcessOutcome::AlreadyCovered) => {}
                    Err(NodeError::Checkpoint(ProcessError::Pending(hash))) => {
                        debug!(peer = %peer.addr(), %hash, "checkpoint waiting for its block");
                    }
                    Err(e) => debug!(peer = %peer.addr(), "checkpoint refused: {e}"),
                }
            }
            NetworkMessage::GetBlocks { locator, stop } => {
                debug!(peer = %peer.addr(), locator = locator.len(), %stop, "peer requested blocks");
            }
            NetworkMessage::GetData(items) => {
                debug!(peer = %peer.addr(), count = items.len(), "peer requested data");
            }
        }
    }

    /// Run the event loop until the network shuts down.
    pub async fn run(self: &Arc<Self>) {
        let Some(event_rx) = &self.event_rx else {
            warn!("no network event receiver; event loop idle");
            return std::future::pending().await;
        };
        let mut rx = event_rx.lock().await;
        while let Some(event) = rx.recv().await {
            self.handle_event(event);
        }
        info!("network event channel closed, shutting down");
    }

    /// Run a checkpoint message through the manager under the chain lock.
    pub fn process_checkpoint(
        &self,
        signed: &SignedCheckpoint,
        from: Option<&dyn CheckpointPeer>,
    ) -> Result<ProcessOutcome, NodeError> {
        let _chain = self.orphans.lock();
        Ok(self.checkpoints.process(signed, from)?)
    }

    // --- Checkpoint operations for RPC ---

    pub fn checkpoint_info(&self) -> CheckpointInfo {
        self.checkpoints.info()
    }

    /// Sign and broadcast a checkpoint for `hash`. Authority nodes only.
    pub fn send_checkpoint(&self, hash: Hash256) -> Result<ProcessOutcome, NodeError> {
        let _chain = self.orphans.lock();
        Ok(self.checkpoints.send_checkpoint(hash)?)
    }

    /// Sign and broadcast a checkpoint at the configured depth.
    pub fn auto_checkpoint(&self) -> Result<(Hash256, ProcessOutcome), NodeError> {
        let _chain = self.orphans.lock();
        Ok(self.checkpoints.auto_checkpoint()?)
    }

    /// Reset the sync checkpoint to the last hardened checkpoint.
    pub fn reset_checkpoint(&self) -> Result<Hash256, NodeError> {
        let _chain = self.orphans.lock();
        Ok(self.checkpoints.reset()?)
    }

    pub fn checkpoints(&self) -> &SyncCheckpointManager {
        &self.checkpoints
    }

    // --- Chain queries ---

    pub fn block_count(&self) -> u32 {
        self.index.best_height()
    }

    pub fn best_hash(&self) -> Hash256 {
        self.index
            .hash(self.index.best_tip())
            .unwrap_or_else(|| self.index.genesis_hash())
    }

    pub fn contains_block(&self, hash: &Hash256) -> bool {
        self.index.contains(hash)
    }

    pub fn is_orphan(&self, hash: &Hash256) -> bool {
        self.orphans.lock().contains_key(hash)
    }

    pub fn peer_count(&self) -> usize {
        self.network.as_ref().map_or(0, NetworkNode::peer_count)
    }

    pub fn network(&self) -> Option<&NetworkNode> {
        self.network.as_ref()
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Flush storage before shutdown.
    pub fn flush(&self) -> Result<(), NodeError> {
        Ok(self.storage.flush()?)
    }
}

/// Rebuild the in-memory index from storage and restore the best tip.
fn load_index(index: &MemoryChainIndex, storage: &RocksStore) -> Result<(), NodeError> {
    let entries = storage.load_block_index()?;
    for entry in entries.iter().filter(|e| e.height > 0) {
        if let Err(e) = index.insert(entry.hash, entry.prev_hash, entry.timestamp) {
            warn!(hash = %entry.hash, "skipping stored header: {e}");
        }
    }
    if let Some(handle) = storage.read_best_tip()?.and_then(|tip| index.lookup(&tip)) {
        index.set_best_chain(handle)?;
    }
    if !entries.is_empty() {
        info!(headers = entries.len(), height = index.best_height(), "loaded block index");
    }
    Ok(())
}
