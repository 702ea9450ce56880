//! Node configuration for the Phoenix full node.
//!
//! [`NodeConfig`] has usable defaults for every field. [`NodeConfig::load`]
//! layers an optional TOML file and `PHX_*` environment variables on top;
//! command-line flags are applied by the binary afterwards.

use std::convert::Infallible;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Deserializer};
use zeroize::Zeroizing;

use phx_checkpoint::CheckpointPolicy;
use phx_core::constants::{CHECKPOINT_DEFAULT_DEPTH, NetworkType};
use phx_network::NetworkConfig;

use crate::error::NodeError;

/// Hex-encoded checkpoint master key, wiped on drop and never printed.
#[derive(Clone)]
pub struct MasterKeyHex(Zeroizing<String>);

impl MasterKeyHex {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(Zeroizing::new(hex.into()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl FromStr for MasterKeyHex {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl<'de> Deserialize<'de> for MasterKeyHex {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

impl fmt::Debug for MasterKeyHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKeyHex(<redacted>)")
    }
}

/// Configuration for a full node instance.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// IP address for the JSON-RPC server to bind to.
    pub rpc_bind: String,
    /// Port for the JSON-RPC server.
    pub rpc_port: u16,
    /// P2P network configuration. Also selects mainnet or testnet.
    pub network: NetworkConfig,
    /// Log level filter string (e.g. "info", "debug", "phx_checkpoint=trace").
    pub log_level: String,
    /// How strictly the sync checkpoint is enforced on new blocks.
    pub checkpoint_policy: CheckpointPolicy,
    /// Depth below the best tip used by `autocheckpoint`.
    pub checkpoint_depth: u32,
    /// Checkpoint master key. Only the checkpoint authority sets this.
    pub checkpoint_key: Option<MasterKeyHex>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self::for_network(NetworkType::Mainnet)
    }
}

/// Shape of the TOML file and the environment overlay. Every field is
/// optional; missing ones keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    network: Option<String>,
    data_dir: Option<PathBuf>,
    rpc_bind: Option<String>,
    rpc_port: Option<u16>,
    listen_addr: Option<String>,
    listen_port: Option<u16>,
    max_peers: Option<usize>,
    connect: Option<Vec<String>>,
    log_level: Option<String>,
    checkpoint_policy: Option<CheckpointPolicy>,
    checkpoint_depth: Option<u32>,
    checkpoint_key: Option<MasterKeyHex>,
}

impl NodeConfig {
    /// Defaults for `network`.
    pub fn for_network(network: NetworkType) -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("phoenix")
            .join(network.data_dir_suffix());

        Self {
            data_dir,
            rpc_bind: "127.0.0.1".to_string(),
            rpc_port: network.default_rpc_port(),
            network: NetworkConfig::for_network(network),
            log_level: "info".to_string(),
            checkpoint_policy: CheckpointPolicy::default(),
            checkpoint_depth: CHECKPOINT_DEFAULT_DEPTH,
            checkpoint_key: None,
        }
    }

    /// Load defaults, then `file` (TOML, optional), then `PHX_*`
    /// environment variables. A `network` given by the caller wins over
    /// both.
    pub fn load(file: Option<&Path>, network: Option<NetworkType>) -> Result<Self, NodeError> {
        let mut builder = config::Config::builder();
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix("PHX")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("connect"),
            )
            .build()
            .map_err(|e| NodeError::Config(e.to_string()))?;
        let mut layer: ConfigLayer = settings
            .try_deserialize()
            .map_err(|e| NodeError::Config(e.to_string()))?;
        if let Some(network) = network {
            layer.network = Some(network.name().to_string());
        }
        Self::from_layer(layer)
    }

    fn from_layer(layer: ConfigLayer) -> Result<Self, NodeError> {
        let network = match layer.network.as_deref() {
            Some(name) => name.parse::<NetworkType>().map_err(NodeError::Config)?,
            None => NetworkType::Mainnet,
        };
        let mut cfg = Self::for_network(network);
        if let Some(dir) = layer.data_dir {
            cfg.data_dir = dir;
        }
        if let Some(bind) = layer.rpc_bind {
            cfg.rpc_bind = bind;
        }
        if let Some(port) = layer.rpc_port {
            cfg.rpc_port = port;
        }
        if let Some(addr) = layer.listen_addr {
            cfg.network.listen_addr = addr;
        }
        if let Some(port) = layer.listen_port {
            cfg.network.listen_port = port;
        }
        if let Some(max) = layer.max_peers {
            cfg.network.max_peers = max;
        }
        if let Some(connect) = layer.connect {
            cfg.network.connect = connect;
        }
        if let Some(level) = layer.log_level {
            cfg.log_level = level;
        }
        if let Some(policy) = layer.checkpoint_policy {
            cfg.checkpoint_policy = policy;
        }
        if let Some(depth) = layer.checkpoint_depth {
            cfg.checkpoint_depth = depth;
        }
        cfg.checkpoint_key = layer.checkpoint_key;
        Ok(cfg)
    }

    pub fn network_type(&self) -> NetworkType {
        self.network.network
    }

    /// Path to the RocksDB chain data directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("chaindata")
    }

    /// Socket address string for the RPC server.
    pub fn rpc_addr(&self) -> String {
        format!("{}:{}", self.rpc_bind, self.rpc_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phx_core::constants::DEFAULT_RPC_PORT;
    use std::io::Write;

    #[test]
    fn default_rpc_port() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.rpc_port, DEFAULT_RPC_PORT);
        assert_eq!(cfg.rpc_bind, "127.0.0.1");
    }

    #[test]
    fn default_checkpoint_settings() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.checkpoint_policy, CheckpointPolicy::Strict);
        assert_eq!(cfg.checkpoint_depth, CHECKPOINT_DEFAULT_DEPTH);
        assert!(cfg.checkpoint_key.is_none());
    }

    #[test]
    fn data_dir_is_per_network() {
        let main = NodeConfig::for_network(NetworkType::Mainnet);
        let test = NodeConfig::for_network(NetworkType::Testnet);
        assert!(main.data_dir.ends_with("phoenix/mainnet"));
        assert!(test.data_dir.ends_with("phoenix/testnet"));
    }

    #[test]
    fn db_path_appends_chaindata() {
        let cfg = NodeConfig {
            data_dir: PathBuf::from("/tmp/phx-test"),
            ..NodeConfig::default()
        };
        assert_eq!(cfg.db_path(), PathBuf::from("/tmp/phx-test/chaindata"));
    }

    #[test]
    fn rpc_addr_custom() {
        let cfg = NodeConfig {
            rpc_bind: "0.0.0.0".to_string(),
            rpc_port: 9999,
            ..NodeConfig::default()
        };
        assert_eq!(cfg.rpc_addr(), "0.0.0.0:9999");
    }

    #[test]
    fn master_key_not_printed() {
        let cfg = NodeConfig {
            checkpoint_key: Some(MasterKeyHex::new("deadbeef")),
            ..NodeConfig::default()
        };
        let debug = format!("{cfg:?}");
        assert!(!debug.contains("deadbeef"));
        assert!(debug.contains("redacted"));
    }

    #[test]
    fn master_key_from_file_stays_wrapped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phoenix.toml");
        std::fs::write(&path, "network = \"test\"\ncheckpoint_key = \"c0ffee\"\n").unwrap();

        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_path()))
            .build()
            .unwrap();
        let layer: ConfigLayer = settings.try_deserialize().unwrap();
        assert!(!format!("{layer:?}").contains("c0ffee"));

        let cfg = NodeConfig::from_layer(layer).unwrap();
        assert_eq!(cfg.checkpoint_key.as_ref().map(MasterKeyHex::expose), Some("c0ffee"));
    }

    #[test]
    fn master_key_parses_from_flag_text() {
        let key: MasterKeyHex = "abcd01".parse().unwrap();
        assert_eq!(key.expose(), "abcd01");
        assert_eq!(format!("{key:?}"), "MasterKeyHex(<redacted>)");
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phoenix.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
network = "test"
rpc_port = 20000
checkpoint_policy = "advisory"
checkpoint_depth = 4
connect = ["10.0.0.1:19555"]
"#
        )
        .unwrap();

        let cfg = NodeConfig::load(Some(&path), None).unwrap();
        assert_eq!(cfg.network_type(), NetworkType::Testnet);
        assert_eq!(cfg.network.listen_port, NetworkType::Testnet.default_p2p_port());
        assert_eq!(cfg.rpc_port, 20000);
        assert_eq!(cfg.checkpoint_policy, CheckpointPolicy::Advisory);
        assert_eq!(cfg.checkpoint_depth, 4);
        assert_eq!(cfg.network.connect, vec!["10.0.0.1:19555".to_string()]);
    }

    #[test]
    fn caller_network_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("phoenix.toml");
        std::fs::write(&path, "network = \"main\"\n").unwrap();
        let cfg = NodeConfig::load(Some(&path), Some(NetworkType::Testnet)).unwrap();
        assert_eq!(cfg.network_type(), NetworkType::Testnet);
        assert_eq!(cfg.rpc_port, NetworkType::Testnet.default_rpc_port());
    }

    #[test]
    fn unknown_network_rejected() {
        let layer = ConfigLayer {
            network: Some("regtest".into()),
            ..ConfigLayer::default()
        };
        assert!(matches!(NodeConfig::from_layer(layer), Err(NodeError::Config(_))));
    }
}
