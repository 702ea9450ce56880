//! Node-level error type.
use thiserror::Error;

use phx_checkpoint::error::{AuthorityError, ProcessError, RegistryError};
use phx_core::error::{ChainError, NetworkError, StorageError};
use phx_core::types::Hash256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    #[error(transparent)] Storage(#[from] StorageError),
    #[error(transparent)] Chain(#[from] ChainError),
    #[error(transparent)] Network(#[from] NetworkError),
    #[error(transparent)] Registry(#[from] RegistryError),
    #[error(transparent)] Authority(#[from] AuthorityError),
    #[error(transparent)] Checkpoint(#[from] ProcessError),
    #[error("block {0} conflicts with the sync checkpoint")] SyncConflict(Hash256),
    #[error("fork at height {height} would reorganize below the last hardened checkpoint")] BelowHardened { height: u32 },
    #[error("configuration: {0}")] Config(String),
}
