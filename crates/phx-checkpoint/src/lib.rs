//! # phx-checkpoint -- Hardened and synchronized checkpoints.
//!
//! Two layers pin the chain:
//!
//! - the compiled-in [`CheckpointRegistry`], a floor below which no
//!   reorganization is accepted;
//! - the sync checkpoint, signed by the network's checkpoint authority,
//!   broadcast over P2P and adopted by every node through the
//!   [`SyncCheckpointManager`].
//!
//! The chain itself is reached only through the
//! [`ChainIndex`](phx_core::chain_index::ChainIndex) and
//! [`ChainPromoter`](phx_core::chain_index::ChainPromoter) traits, storage
//! through [`CheckpointStore`](phx_core::store::CheckpointStore), and peers
//! through [`PeerDirectory`](relay::PeerDirectory).

pub mod authority;
pub mod error;
pub mod manager;
pub mod message;
pub mod policy;
pub mod registry;
pub mod relay;
pub mod selector;
pub mod state;
pub mod validator;

pub use authority::SignatureAuthority;
pub use manager::{
    CheckpointInfo, CheckpointServices, ProcessOutcome, SyncCheckpointManager, SyncVerdict,
};
pub use message::{SignedCheckpoint, UnsignedCheckpoint, VerifiedCheckpoint};
pub use policy::CheckpointPolicy;
pub use registry::{CheckpointEntry, CheckpointRegistry};
