//! Network configuration for the Phoenix P2P layer.

use phx_core::constants::NetworkType;

/// Configuration for the P2P listener and outbound connections.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Which network's magic bytes and ports to use.
    pub network: NetworkType,
    /// IP address to listen on.
    pub listen_addr: String,
    /// TCP port to listen on.
    pub listen_port: u16,
    /// Peers (`host:port`) to dial on startup.
    pub connect: Vec<String>,
    /// Maximum number of connected peers.
    pub max_peers: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self::for_network(NetworkType::Mainnet)
    }
}

impl NetworkConfig {
    /// Defaults for `network`.
    pub fn for_network(network: NetworkType) -> Self {
        Self {
            network,
            listen_addr: "0.0.0.0".to_string(),
            listen_port: network.default_p2p_port(),
            connect: Vec::new(),
            max_peers: 125,
        }
    }

    pub fn mainnet() -> Self {
        Self::for_network(NetworkType::Mainnet)
    }

    pub fn testnet() -> Self {
        Self::for_network(NetworkType::Testnet)
    }

    /// `addr:port` string for the listener.
    pub fn listen_socket(&self) -> String {
        format!("{}:{}", self.listen_addr, self.listen_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phx_core::constants::DEFAULT_P2P_PORT;

    #[test]
    fn default_config_uses_mainnet_port() {
        let cfg = NetworkConfig::default();
        assert_eq!(cfg.network, NetworkType::Mainnet);
        assert_eq!(cfg.listen_port, DEFAULT_P2P_PORT);
        assert!(cfg.connect.is_empty());
    }

    #[test]
    fn testnet_uses_testnet_port() {
        let cfg = NetworkConfig::testnet();
        assert_eq!(cfg.listen_port, NetworkType::Testnet.default_p2p_port());
    }

    #[test]
    fn listen_socket_format() {
        let cfg = NetworkConfig {
            listen_addr: "127.0.0.1".to_string(),
            listen_port: 9999,
            ..NetworkConfig::default()
        };
        assert_eq!(cfg.listen_socket(), "127.0.0.1:9999");
    }
}
