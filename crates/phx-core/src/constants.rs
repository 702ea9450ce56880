//! Protocol constants and network selection.

use std::fmt;
use std::str::FromStr;

use crate::types::Hash256;

/// Format version written into every checkpoint payload.
pub const CHECKPOINT_VERSION: i32 = 1;

/// Confirmations after which an ordinary transaction is considered final.
pub const TX_MATURITY: u32 = 10;

/// Default depth below the best tip at which the authority picks the next
/// checkpoint.
///
/// Must not exceed [`TX_MATURITY`] or double spends inside the unanchored
/// window become cheap; a very small value risks anchoring a fork with less
/// work behind it.
pub const CHECKPOINT_DEFAULT_DEPTH: u32 = TX_MATURITY;

/// Blocks that must be built on top of a sync checkpoint before it counts as
/// mature.
pub const BASE_MATURITY: u32 = 100;

/// Upper bound for each variable-length field of a checkpoint message.
pub const MAX_CHECKPOINT_FIELD_SIZE: usize = 1024;

/// Maximum number of hashes in a block locator.
pub const MAX_LOCATOR_SIZE: usize = 64;

/// Maximum size of a single P2P message payload.
pub const MAX_PAYLOAD_SIZE: usize = 2 * 1024 * 1024;

/// Default P2P port (mainnet).
pub const DEFAULT_P2P_PORT: u16 = 9555;

/// Default JSON-RPC port (mainnet).
pub const DEFAULT_RPC_PORT: u16 = 9554;

/// Mainnet genesis block hash.
pub const MAINNET_GENESIS_HASH: Hash256 =
    Hash256::from_hex_const("be2f30f9e8db8f430056869c43503a992d232b28508e83eda101161a18cf7c73");

/// Mainnet genesis block timestamp.
pub const MAINNET_GENESIS_TIME: u32 = 1_317_972_665;

/// Testnet genesis block hash.
pub const TESTNET_GENESIS_HASH: Hash256 =
    Hash256::from_hex_const("ecd47eee16536f7d03d64643cfc8c61b22093f8bf2c9358bf8b6f4dcb5f13192");

/// Testnet genesis block timestamp.
pub const TESTNET_GENESIS_TIME: u32 = 1_383_768_000;

/// Uncompressed secp256k1 public key of the mainnet checkpoint authority.
pub const MAINNET_CHECKPOINT_PUBKEY: &str = "047b13b3ae2132afa4e216671cd1cad76866643049cad069c296235891c1db907bffa319a9ad9a28c54bcd9ab5f5d0f03dac6abac44f227c436c9f66eee2bd38c2";

/// Uncompressed secp256k1 public key of the testnet checkpoint authority.
pub const TESTNET_CHECKPOINT_PUBKEY: &str = "0460d85a95e4a867be3bbd860b5c699e1017b7090f81d84b4de698bdb2d320ad7d856fe0172b7b486ddf734f21e6f9012f1f1eaa749882009f8675d1a24dc73fe0";

/// Network type: Mainnet or Testnet.
///
/// Selects magic bytes, default ports, data directory suffix, genesis block,
/// the compiled-in checkpoint authority key and the hardened checkpoint table.
///
/// # Examples
///
/// ```
/// use phx_core::constants::NetworkType;
/// let net = NetworkType::default();
/// assert_eq!(net, NetworkType::Mainnet);
/// assert_eq!(net.name(), "main");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NetworkType {
    /// Production network.
    #[default]
    Mainnet,
    /// Public test network.
    Testnet,
}

impl NetworkType {
    /// Short name used in configuration files and RPC output.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Mainnet => "main",
            Self::Testnet => "test",
        }
    }

    /// Four-byte network identifier prepended to all P2P messages.
    pub fn magic_bytes(&self) -> [u8; 4] {
        match self {
            Self::Mainnet => [0xfe, 0xa5, 0x03, 0xfd],
            Self::Testnet => [0xfe, 0xa5, 0x02, 0x01],
        }
    }

    /// Default TCP port for P2P connections.
    ///
    /// # Examples
    ///
    /// ```
    /// use phx_core::constants::NetworkType;
    /// assert_eq!(NetworkType::Mainnet.default_p2p_port(), 9555);
    /// assert_eq!(NetworkType::Testnet.default_p2p_port(), 19555);
    /// ```
    pub fn default_p2p_port(&self) -> u16 {
        match self {
            Self::Mainnet => DEFAULT_P2P_PORT,
            Self::Testnet => 19555,
        }
    }

    /// Default TCP port for the JSON-RPC server.
    pub fn default_rpc_port(&self) -> u16 {
        match self {
            Self::Mainnet => DEFAULT_RPC_PORT,
            Self::Testnet => 19554,
        }
    }

    /// Subdirectory name appended to the base data directory path.
    pub fn data_dir_suffix(&self) -> &'static str {
        match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
        }
    }

    /// Genesis block hash.
    pub fn genesis_hash(&self) -> Hash256 {
        match self {
            Self::Mainnet => MAINNET_GENESIS_HASH,
            Self::Testnet => TESTNET_GENESIS_HASH,
        }
    }

    /// Genesis block timestamp.
    pub fn genesis_time(&self) -> u32 {
        match self {
            Self::Mainnet => MAINNET_GENESIS_TIME,
            Self::Testnet => TESTNET_GENESIS_TIME,
        }
    }

    /// Hex-encoded public key of the checkpoint authority for this network.
    pub fn checkpoint_pubkey_hex(&self) -> &'static str {
        match self {
            Self::Mainnet => MAINNET_CHECKPOINT_PUBKEY,
            Self::Testnet => TESTNET_CHECKPOINT_PUBKEY,
        }
    }
}

impl fmt::Display for NetworkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for NetworkType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "main" | "mainnet" => Ok(Self::Mainnet),
            "test" | "testnet" => Ok(Self::Testnet),
            other => Err(format!("unknown network: {other}")),
        }
    }
}
