//! JSON-RPC server for the Phoenix full node.
//!
//! Uses jsonrpsee 0.24 to expose the checkpoint commands (`getcheckpoint`,
//! `sendcheckpoint`, `autocheckpoint`, `resetcheckpoint`) and a minimal
//! chain query (`getblockcount`). Hashes travel as display-order hex.

use std::sync::Arc;

use jsonrpsee::core::async_trait;
use jsonrpsee::proc_macros::rpc;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use serde::{Deserialize, Serialize};

use phx_checkpoint::error::ProcessError;
use phx_checkpoint::{CheckpointInfo, ProcessOutcome};
use phx_core::types::Hash256;

use crate::error::NodeError;
use crate::node::Node;

/// JSON representation of the sync checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointJson {
    /// Accepted sync checkpoint hash.
    pub synccheckpoint: String,
    /// Height of the checkpointed block, if indexed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Checkpointed block time, formatted as UTC.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Enforcement policy: strict, advisory or permissive.
    pub policy: String,
    /// Present and true when this node holds the checkpoint master key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkpointmaster: Option<bool>,
    /// Checkpoint waiting for its block, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<String>,
}

impl From<CheckpointInfo> for CheckpointJson {
    fn from(info: CheckpointInfo) -> Self {
        Self {
            synccheckpoint: info.hash.to_string(),
            height: info.height,
            timestamp: info.timestamp.and_then(format_time),
            policy: info.policy.to_string(),
            checkpointmaster: info.has_authority_key.then_some(true),
            pending: info.pending.map(|h| h.to_string()),
        }
    }
}

/// Result of `sendcheckpoint` and `autocheckpoint`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendCheckpointJson {
    /// Hash that was signed.
    pub hash: String,
    /// Whether the sync checkpoint moved to it.
    pub adopted: bool,
    /// Sync checkpoint after the call.
    pub checkpoint: CheckpointJson,
}

fn format_time(ts: u32) -> Option<String> {
    chrono::DateTime::from_timestamp(i64::from(ts), 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
}

/// Parse a display-order hex block hash.
pub fn parse_hash(hex_str: &str) -> Result<Hash256, ErrorObjectOwned> {
    if hex_str.len() != 64 {
        return Err(rpc_error(-8, "hash must be 64 hex characters"));
    }
    hex_str
        .parse::<Hash256>()
        .map_err(|_| rpc_error(-8, "invalid hex in hash"))
}

/// Create a JSON-RPC error.
fn rpc_error(code: i32, msg: &str) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code, msg.to_string(), None::<()>)
}

fn node_error(e: NodeError) -> ErrorObjectOwned {
    let code = match &e {
        NodeError::Checkpoint(ProcessError::NoAuthorityKey) => -4,
        NodeError::Checkpoint(ProcessError::Pending(_)) => -5,
        NodeError::Checkpoint(p) if p.is_conflict() => -25,
        _ => -1,
    };
    rpc_error(code, &e.to_string())
}

/// The Phoenix JSON-RPC interface.
#[rpc(server)]
pub trait PhxRpc {
    /// Returns the best header height.
    #[method(name = "getblockcount")]
    async fn get_block_count(&self) -> Result<u32, ErrorObjectOwned>;

    /// Shows the current sync checkpoint.
    #[method(name = "getcheckpoint")]
    async fn get_checkpoint(&self) -> Result<CheckpointJson, ErrorObjectOwned>;

    /// Signs and broadcasts a checkpoint for the given block hash.
    #[method(name = "sendcheckpoint")]
    async fn send_checkpoint(&self, hash: String) -> Result<SendCheckpointJson, ErrorObjectOwned>;

    /// Signs and broadcasts a checkpoint at the configured depth.
    #[method(name = "autocheckpoint")]
    async fn auto_checkpoint(&self) -> Result<SendCheckpointJson, ErrorObjectOwned>;

    /// Resets the sync checkpoint to the last hardened checkpoint.
    #[method(name = "resetcheckpoint")]
    async fn reset_checkpoint(&self) -> Result<CheckpointJson, ErrorObjectOwned>;
}

/// Implementation of the Phoenix JSON-RPC server.
pub struct RpcServerImpl {
    node: Arc<Node>,
}

impl RpcServerImpl {
    pub fn new(node: Arc<Node>) -> Self {
        Self { node }
    }

    fn sent(&self, hash: Hash256, outcome: ProcessOutcome) -> SendCheckpointJson {
        SendCheckpointJson {
            hash: hash.to_string(),
            adopted: outcome == ProcessOutcome::Adopted,
            checkpoint: self.node.checkpoint_info().into(),
        }
    }
}

#[async_trait]
impl PhxRpcServer for RpcServerImpl {
    async fn get_block_count(&self) -> Result<u32, ErrorObjectOwned> {
        Ok(self.node.block_count())
    }

    async fn get_checkpoint(&self) -> Result<CheckpointJson, ErrorObjectOwned> {
        Ok(self.node.checkpoint_info().into())
    }

    async fn send_checkpoint(&self, hash: String) -> Result<SendCheckpointJson, ErrorObjectOwned> {
        let hash = parse_hash(&hash)?;
        let outcome = self.node.send_checkpoint(hash).map_err(node_error)?;
        Ok(self.sent(hash, outcome))
    }

    async fn auto_checkpoint(&self) -> Result<SendCheckpointJson, ErrorObjectOwned> {
        let (hash, outcome) = self.node.auto_checkpoint().map_err(node_error)?;
        Ok(self.sent(hash, outcome))
    }

    async fn reset_checkpoint(&self) -> Result<CheckpointJson, ErrorObjectOwned> {
        self.node.reset_checkpoint().map_err(node_error)?;
        Ok(self.node.checkpoint_info().into())
    }
}

/// Start the JSON-RPC server on `addr`.
pub async fn start_rpc_server(addr: &str, node: Arc<Node>) -> Result<ServerHandle, NodeError> {
    let server = Server::builder()
        .build(addr)
        .await
        .map_err(|e| NodeError::Config(format!("RPC server error: {e}")))?;

    let rpc_impl = RpcServerImpl::new(node);
    let handle = server.start(rpc_impl.into_rpc());

    Ok(handle)
}
