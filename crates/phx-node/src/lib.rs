//! # phx-node -- Full node: RocksDB, RPC, orchestration.
//!
//! Composes the Phoenix subsystems into a running node:
//! - [`storage::RocksStore`]: header index and sync checkpoint in RocksDB
//! - [`node::Node`]: header acceptance, checkpoint manager, and event loop
//! - [`rpc`]: JSON-RPC server for the checkpoint commands
//! - [`config::NodeConfig`]: node configuration

pub mod config;
pub mod error;
pub mod node;
pub mod rpc;
pub mod storage;

pub use config::NodeConfig;
pub use error::NodeError;
pub use node::{HeaderOutcome, Node};
pub use rpc::start_rpc_server;
pub use storage::RocksStore;
