//! Synchronized checkpoint manager.
//!
//! Owns the sync-checkpoint state and runs every checkpoint through the
//! same pipeline, whether it was signed locally or received from a peer:
//!
//! 1. verify the signature against the network authority key;
//! 2. take the state lock;
//! 3. park the checkpoint as pending if its block is not indexed yet;
//! 4. check ancestry against the accepted checkpoint;
//! 5. promote the checkpointed chain if it is not the main chain;
//! 6. persist, then commit in memory;
//! 7. release the lock and relay.
//!
//! The lock is held from step 2 to step 6, so two conflicting checkpoints
//! are serialized and the second one sees the first one's result. A failure
//! at any step leaves the accepted checkpoint where it was.
//!
//! # Attack vectors
//!
//! - **Forged checkpoints:** rejected at step 1 before any state is read.
//!   Signature failures are logged at debug level only.
//! - **Conflicting checkpoints:** a correctly signed checkpoint that does
//!   not extend the accepted one is refused and remembered as invalid.
//! - **Replay:** re-sending an adopted or older checkpoint is a no-op with
//!   no storage writes and no relay.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use phx_core::chain_index::{BlockHandle, ChainIndex, ChainPromoter};
use phx_core::constants::CHECKPOINT_DEFAULT_DEPTH;
use phx_core::store::CheckpointStore;
use phx_core::types::Hash256;

use crate::authority::SignatureAuthority;
use crate::error::{ProcessError, ValidationError};
use crate::message::{SignedCheckpoint, VerifiedCheckpoint};
use crate::policy::CheckpointPolicy;
use crate::registry::CheckpointRegistry;
use crate::relay::{CheckpointPeer, PeerDirectory, relay_to, relay_to_all};
use crate::selector::select_candidate;
use crate::state::SyncCheckpointState;
use crate::validator::{self, ValidationOutcome};

/// External collaborators of the manager.
#[derive(Clone)]
pub struct CheckpointServices {
    pub index: Arc<dyn ChainIndex>,
    pub promoter: Arc<dyn ChainPromoter>,
    pub store: Arc<dyn CheckpointStore>,
    pub peers: Arc<dyn PeerDirectory>,
}

/// Successful result of processing a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The checkpoint became the accepted checkpoint.
    Adopted,
    /// The checkpoint is the accepted one or one of its ancestors.
    AlreadyCovered,
}

/// Result of checking a new block against the sync checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncVerdict {
    /// Consistent with the sync checkpoint, or not checked.
    Accepted,
    /// Inconsistent, but the advisory policy admits it.
    Flagged,
    /// Inconsistent and refused.
    Rejected,
}

impl SyncVerdict {
    pub fn admits(&self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

/// Snapshot for RPC and status output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointInfo {
    pub hash: Hash256,
    pub height: Option<u32>,
    pub timestamp: Option<u32>,
    pub policy: CheckpointPolicy,
    pub has_authority_key: bool,
    pub pending: Option<Hash256>,
}

pub struct SyncCheckpointManager {
    authority: SignatureAuthority,
    registry: CheckpointRegistry,
    policy: CheckpointPolicy,
    checkpoint_depth: u32,
    index: Arc<dyn ChainIndex>,
    promoter: Arc<dyn ChainPromoter>,
    store: Arc<dyn CheckpointStore>,
    peers: Arc<dyn PeerDirectory>,
    state: Mutex<SyncCheckpointState>,
}

impl SyncCheckpointManager {
    /// Create the manager and restore the accepted checkpoint.
    ///
    /// - Nothing persisted: genesis is written and adopted.
    /// - Persisted block indexed: it is adopted.
    /// - Persisted block missing from the index: the checkpoint is reset to
    ///   the newest hardened checkpoint on the main chain.
    pub fn open(
        authority: SignatureAuthority,
        registry: CheckpointRegistry,
        policy: CheckpointPolicy,
        services: CheckpointServices,
    ) -> Result<Self, ProcessError> {
        let genesis = services.index.genesis_hash();
        let manager = Self {
            authority,
            registry,
            policy,
            checkpoint_depth: CHECKPOINT_DEFAULT_DEPTH,
            index: services.index,
            promoter: services.promoter,
            store: services.store,
            peers: services.peers,
            state: Mutex::new(SyncCheckpointState::new(genesis)),
        };
        manager.restore()?;
        Ok(manager)
    }

    /// Depth used by [`auto_checkpoint`](Self::auto_checkpoint).
    pub fn with_checkpoint_depth(mut self, depth: u32) -> Self {
        self.checkpoint_depth = depth;
        self
    }

    fn restore(&self) -> Result<(), ProcessError> {
        let mut state = self.state.lock();
        let stored = self
            .store
            .read_sync_checkpoint()
            .map_err(ProcessError::PersistFailed)?;
        match stored {
            Some(hash) if self.index.contains(&hash) => {
                state.reset_to(hash);
                info!(%hash, "restored sync checkpoint");
            }
            Some(hash) => {
                warn!(%hash, "persisted sync checkpoint not in block index, resetting");
                self.reset_locked(&mut state)?;
            }
            None => {
                let genesis = self.index.genesis_hash();
                self.persist(&genesis)?;
                state.reset_to(genesis);
                info!(%genesis, "initialized sync checkpoint at genesis");
            }
        }
        Ok(())
    }

    /// Run a checkpoint message through the acceptance pipeline.
    ///
    /// `from` is the peer that sent it, if any. The sender is marked as
    /// knowing the checkpoint, and is asked for the missing blocks when the
    /// checkpoint has to wait.
    ///
    /// # Errors
    ///
    /// [`ProcessError::Pending`] is expected while the chain catches up;
    /// every other error leaves the accepted checkpoint untouched.
    pub fn process(
        &self,
        signed: &SignedCheckpoint,
        from: Option<&dyn CheckpointPeer>,
    ) -> Result<ProcessOutcome, ProcessError> {
        let verified = self.authority.verify(signed).map_err(|e| {
            debug!("dropping checkpoint message: {e}");
            ProcessError::BadSignature(e)
        })?;
        let hash = verified.hash();
        if let Some(peer) = from {
            peer.replace_known_checkpoint(hash);
        }

        let mut state = self.state.lock();
        if !self.index.contains(&hash) {
            info!(%hash, "sync checkpoint pending");
            state.pending = Some(verified);
            if let Some(peer) = from {
                self.request_missing(peer, hash);
            }
            return Err(ProcessError::Pending(hash));
        }

        if self.validate_locked(&mut state, &hash)? == ValidationOutcome::AncestorOrEqual {
            debug!(%hash, accepted = %state.accepted, "checkpoint already covered");
            return Ok(ProcessOutcome::AlreadyCovered);
        }
        self.adopt_locked(&mut state, verified.clone())?;
        drop(state);

        let relayed = relay_to_all(self.peers.as_ref(), &verified);
        info!(%hash, relayed, "sync checkpoint advanced");
        Ok(ProcessOutcome::Adopted)
    }

    /// Retry the pending checkpoint once its block may have arrived.
    ///
    /// Called after every connected block. Returns `Ok(true)` if the pending
    /// checkpoint was adopted. A pending checkpoint that turns out to be old
    /// or conflicting is dropped.
    pub fn accept_pending(&self) -> Result<bool, ProcessError> {
        let mut state = self.state.lock();
        let Some(pending) = state.pending.clone() else {
            return Ok(false);
        };
        let hash = pending.hash();
        if !self.index.contains(&hash) {
            return Ok(false);
        }

        match self.validate_locked(&mut state, &hash) {
            Ok(ValidationOutcome::Descendant) => {}
            Ok(ValidationOutcome::AncestorOrEqual) => {
                state.pending = None;
                debug!(%hash, "pending checkpoint already covered");
                return Ok(false);
            }
            Err(e) => {
                state.pending = None;
                return Err(e);
            }
        }
        self.adopt_locked(&mut state, pending.clone())?;
        drop(state);

        let relayed = relay_to_all(self.peers.as_ref(), &pending);
        info!(%hash, relayed, "pending sync checkpoint accepted");
        Ok(true)
    }

    /// Check a new block on top of `parent` against the sync checkpoint,
    /// applying the configured policy.
    pub fn check_block_against_sync(&self, block_hash: &Hash256, parent: BlockHandle) -> SyncVerdict {
        if self.policy == CheckpointPolicy::Permissive {
            return SyncVerdict::Accepted;
        }
        let state = self.state.lock();
        let consistent =
            match validator::check_block(self.index.as_ref(), &state.accepted, block_hash, parent) {
                Ok(consistent) => consistent,
                Err(e) => {
                    error!(block = %block_hash, "sync checkpoint check failed: {e}");
                    false
                }
            };
        if consistent {
            return SyncVerdict::Accepted;
        }
        if self.policy == CheckpointPolicy::Strict {
            warn!(block = %block_hash, sync = %state.accepted, "block rejected by sync checkpoint");
            SyncVerdict::Rejected
        } else {
            warn!(block = %block_hash, sync = %state.accepted, "block conflicts with sync checkpoint");
            SyncVerdict::Flagged
        }
    }

    /// Sign a checkpoint for `hash` with the master key and process it.
    pub fn send_checkpoint(&self, hash: Hash256) -> Result<ProcessOutcome, ProcessError> {
        let signed = self.authority.sign(hash)?;
        self.process(&signed, None)
            .inspect_err(|e| warn!(%hash, "own checkpoint not processed: {e}"))
    }

    /// Checkpoint the block [`checkpoint_depth`](Self::checkpoint_depth)
    /// below the best tip.
    pub fn auto_checkpoint(&self) -> Result<(Hash256, ProcessOutcome), ProcessError> {
        if !self.authority.has_master_key() {
            return Err(ProcessError::NoAuthorityKey);
        }
        let best = self.index.best_tip();
        let hash = select_candidate(self.index.as_ref(), best, self.checkpoint_depth)
            .ok_or_else(|| ProcessError::ChainIndexCorrupt("best tip not indexed".into()))?;
        let outcome = self.send_checkpoint(hash)?;
        Ok((hash, outcome))
    }

    /// Whether `hash` is the pending checkpoint block, or the missing root
    /// of the orphan chain leading to it.
    pub fn wanted_by_pending(&self, hash: &Hash256) -> bool {
        let Some(pending) = self.state.lock().pending_hash() else {
            return false;
        };
        *hash == pending || self.index.orphan_wanted(&pending) == Some(*hash)
    }

    /// Ask `peer` for the pending checkpoint block if we have neither it nor
    /// an orphan chain leading to it.
    pub fn ask_for_pending(&self, peer: &dyn CheckpointPeer) {
        let Some(pending) = self.state.lock().pending_hash() else {
            return;
        };
        if !self.index.contains(&pending) && self.index.orphan_wanted(&pending).is_none() {
            peer.ask_for_block(pending);
        }
    }

    /// Greet a newly connected peer: send the last adopted checkpoint and
    /// ask for the pending block.
    pub fn announce_to(&self, peer: &dyn CheckpointPeer) {
        let last = self.state.lock().last_message.clone();
        if let Some(message) = last {
            relay_to(peer, &message);
        }
        self.ask_for_pending(peer);
    }

    /// Fall back to the newest hardened checkpoint on the main chain, or to
    /// genesis if none is.
    pub fn reset(&self) -> Result<Hash256, ProcessError> {
        let mut state = self.state.lock();
        self.reset_locked(&mut state)
    }

    /// Whether `maturity` blocks have been built on the sync checkpoint.
    pub fn is_mature(&self, maturity: u32) -> bool {
        let accepted = self.accepted_hash();
        let Some(height) = self.index.lookup(&accepted).and_then(|h| self.index.height(h)) else {
            return false;
        };
        let best = self.index.height(self.index.best_tip()).unwrap_or(0);
        u64::from(best) >= u64::from(height) + u64::from(maturity)
    }

    /// Whether the sync checkpoint block is more than `seconds` older than
    /// `now` (Unix seconds).
    pub fn is_too_old(&self, seconds: u32, now: u64) -> bool {
        let accepted = self.accepted_hash();
        match self.index.lookup(&accepted).and_then(|h| self.index.entry(h)) {
            Some(entry) => u64::from(entry.timestamp) + u64::from(seconds) < now,
            None => true,
        }
    }

    pub fn info(&self) -> CheckpointInfo {
        let (hash, pending) = {
            let state = self.state.lock();
            (state.accepted, state.pending_hash())
        };
        let entry = self.index.lookup(&hash).and_then(|h| self.index.entry(h));
        CheckpointInfo {
            hash,
            height: entry.map(|e| e.height),
            timestamp: entry.map(|e| e.timestamp),
            policy: self.policy,
            has_authority_key: self.authority.has_master_key(),
            pending,
        }
    }

    pub fn accepted_hash(&self) -> Hash256 {
        self.state.lock().accepted
    }

    pub fn pending_hash(&self) -> Option<Hash256> {
        self.state.lock().pending_hash()
    }

    pub fn invalid_hash(&self) -> Option<Hash256> {
        self.state.lock().invalid
    }

    pub fn last_message(&self) -> Option<VerifiedCheckpoint> {
        self.state.lock().last_message.clone()
    }

    pub fn policy(&self) -> CheckpointPolicy {
        self.policy
    }

    pub fn checkpoint_depth(&self) -> u32 {
        self.checkpoint_depth
    }

    pub fn registry(&self) -> &CheckpointRegistry {
        &self.registry
    }

    pub fn authority(&self) -> &SignatureAuthority {
        &self.authority
    }

    fn request_missing(&self, peer: &dyn CheckpointPeer, hash: Hash256) {
        let locator = self.index.locator(self.index.best_tip());
        peer.request_blocks(locator, hash);
        let wanted = self.index.orphan_wanted(&hash).unwrap_or(hash);
        peer.ask_for_block(wanted);
        debug!(peer = %peer.id(), %hash, %wanted, "requested blocks for pending checkpoint");
    }

    fn validate_locked(
        &self,
        state: &mut SyncCheckpointState,
        hash: &Hash256,
    ) -> Result<ValidationOutcome, ProcessError> {
        let result = validator::validate(self.index.as_ref(), &state.accepted, hash);
        match result {
            Ok(outcome) => Ok(outcome),
            Err(
                err @ (ValidationError::DivergesFromAccepted { .. }
                | ValidationError::NotDescendantOfAccepted { .. }),
            ) => {
                state.invalid = Some(*hash);
                warn!(candidate = %hash, accepted = %state.accepted, "{err}");
                Err(err.into())
            }
            Err(err) => {
                error!(candidate = %hash, "{err}");
                Err(err.into())
            }
        }
    }

    fn adopt_locked(
        &self,
        state: &mut SyncCheckpointState,
        message: VerifiedCheckpoint,
    ) -> Result<(), ProcessError> {
        let hash = message.hash();
        let handle = self
            .index
            .lookup(&hash)
            .ok_or(ProcessError::UnknownBlock(hash))?;
        if !self.index.is_on_main_chain(handle) {
            if let Err(source) = self.promoter.promote(handle) {
                state.invalid = Some(hash);
                error!(%hash, "failed to promote checkpointed chain: {source}");
                return Err(ProcessError::PromotionFailed { hash, source });
            }
            info!(%hash, "checkpointed chain promoted to main chain");
        }
        self.persist(&hash)?;
        state.commit(message);
        Ok(())
    }

    fn reset_locked(&self, state: &mut SyncCheckpointState) -> Result<Hash256, ProcessError> {
        let hash = match self.registry.find_last_in_chain(self.index.as_ref()) {
            Some((_, entry)) => {
                info!(hash = %entry.hash, height = entry.height, "sync checkpoint reset to hardened checkpoint");
                entry.hash
            }
            None => {
                let genesis = self.index.genesis_hash();
                info!(%genesis, "sync checkpoint reset to genesis");
                genesis
            }
        };
        self.persist(&hash)?;
        state.reset_to(hash);
        Ok(hash)
    }

    fn persist(&self, hash: &Hash256) -> Result<(), ProcessError> {
        self.store.write_sync_checkpoint(hash).map_err(|e| {
            error!(%hash, "failed to persist sync checkpoint: {e}");
            ProcessError::PersistFailed(e)
        })
    }
}
