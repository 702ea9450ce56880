//! # phx-network -- P2P networking for Phoenix.
//!
//! Framed TCP connections carrying the checkpoint relay and the block
//! requests the checkpoint subsystem issues.
//!
//! - [`protocol`]: Wire envelope and message payloads.
//! - [`peer`]: Connected peers and the peer table.
//! - [`transport`]: Tokio TCP listener and per-connection tasks.
//! - [`config`]: Listener and dial configuration.

pub mod config;
pub mod peer;
pub mod protocol;
pub mod transport;

pub use config::NetworkConfig;
pub use peer::{Peer, PeerSet};
pub use protocol::{Inventory, InventoryKind, NetworkMessage};
pub use transport::{NetworkNode, PeerEvent};
