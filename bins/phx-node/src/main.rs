//! Phoenix full node binary.
//!
//! Starts a node with RocksDB storage, the synchronized checkpoint
//! subsystem, P2P networking and a JSON-RPC server.

use std::path::PathBuf;
use std::process;

use clap::Parser;
use phx_checkpoint::CheckpointPolicy;
use phx_core::constants::NetworkType;
use phx_node_lib::config::MasterKeyHex;
use phx_node_lib::{Node, NodeConfig, NodeError, start_rpc_server};
use tracing::{error, info};

/// Phoenix full node.
#[derive(Parser)]
#[command(
    name = "phx-node",
    version,
    about = "Phoenix full node with synchronized checkpoints and JSON-RPC server"
)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Data directory for chain data
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Connect to the public test network instead of mainnet
    #[arg(long)]
    testnet: bool,

    /// RPC server bind address
    #[arg(long)]
    rpc_bind: Option<String>,

    /// RPC server port
    #[arg(long)]
    rpc_port: Option<u16>,

    /// P2P listen address
    #[arg(long)]
    listen_addr: Option<String>,

    /// P2P listen port
    #[arg(long)]
    port: Option<u16>,

    /// Peers to connect to (comma-separated host:port)
    #[arg(long, value_delimiter = ',')]
    connect: Vec<String>,

    /// Maximum number of connected peers
    #[arg(long)]
    max_peers: Option<usize>,

    /// Disable P2P networking
    #[arg(long)]
    no_network: bool,

    /// Sync checkpoint enforcement: strict, advisory or permissive
    #[arg(long)]
    checkpoint_policy: Option<CheckpointPolicy>,

    /// Depth below the best block used by autocheckpoint
    #[arg(long)]
    checkpoint_depth: Option<u32>,

    /// Checkpoint master private key (hex). Checkpoint authority only.
    #[arg(long)]
    checkpoint_key: Option<MasterKeyHex>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

impl Args {
    /// Layer CLI flags over the file and environment configuration.
    fn into_config(self) -> Result<(NodeConfig, String, bool), NodeError> {
        let network = self.testnet.then_some(NetworkType::Testnet);
        let mut config = NodeConfig::load(self.config.as_deref(), network)?;

        if let Some(dir) = self.data_dir {
            config.data_dir = dir;
        }
        if let Some(bind) = self.rpc_bind {
            config.rpc_bind = bind;
        }
        if let Some(port) = self.rpc_port {
            config.rpc_port = port;
        }
        if let Some(addr) = self.listen_addr {
            config.network.listen_addr = addr;
        }
        if let Some(port) = self.port {
            config.network.listen_port = port;
        }
        if !self.connect.is_empty() {
            config.network.connect = self.connect;
        }
        if let Some(max) = self.max_peers {
            config.network.max_peers = max;
        }
        if let Some(policy) = self.checkpoint_policy {
            config.checkpoint_policy = policy;
        }
        if let Some(depth) = self.checkpoint_depth {
            config.checkpoint_depth = depth;
        }
        if let Some(key) = self.checkpoint_key {
            config.checkpoint_key = Some(key);
        }
        if let Some(level) = self.log_level {
            config.log_level = level;
        }
        Ok((config, self.log_format, self.no_network))
    }
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let (config, log_format, no_network) = match args.into_config() {
        Ok(parts) => parts,
        Err(e) => {
            eprintln!("invalid configuration: {e}");
            process::exit(1);
        }
    };

    init_logging(&config.log_level, &log_format);

    info!("Phoenix node v{}", env!("CARGO_PKG_VERSION"));
    info!("network: {}", config.network_type());
    info!("data_dir: {:?}", config.data_dir);
    info!("rpc_addr: {}", config.rpc_addr());
    info!("checkpoint_policy: {}", config.checkpoint_policy);
    if !no_network {
        info!("p2p_listen: {}", config.network.listen_socket());
        info!("connect: {:?}", config.network.connect);
    }

    if let Err(e) = std::fs::create_dir_all(&config.data_dir) {
        error!("failed to create data_dir: {}", e);
        process::exit(1);
    }

    let started = if no_network {
        Node::without_network(config.clone())
    } else {
        Node::new(config.clone()).await
    };
    let node = match started {
        Ok(n) => n,
        Err(e) => {
            error!("failed to start node: {}", e);
            process::exit(1);
        }
    };

    let info = node.checkpoint_info();
    info!(
        height = node.block_count(),
        best = %node.best_hash(),
        sync_checkpoint = %info.hash,
        "node initialized"
    );

    let rpc_handle = match start_rpc_server(&config.rpc_addr(), node.clone()).await {
        Ok(handle) => {
            info!("RPC server listening on {}", config.rpc_addr());
            handle
        }
        Err(e) => {
            error!("failed to start RPC server: {}", e);
            process::exit(1);
        }
    };

    info!("Phoenix node running (Ctrl+C to stop)");

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {e}");
            std::future::pending::<()>().await;
        }
        info!("received Ctrl+C, shutting down...");
    };

    tokio::select! {
        _ = node.run() => {
            info!("node event loop exited");
        }
        _ = shutdown_signal => {
            info!("shutdown signal received");
        }
    }

    rpc_handle.stop().ok();
    info!("RPC server stopped");
    if let Err(e) = node.flush() {
        error!("failed to flush storage: {e}");
    }
    info!("Phoenix node shutdown complete");
}

/// Initialize tracing subscriber with the given log level and output format.
///
/// Pass `format = "json"` for structured JSON output. Any other value
/// defaults to human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
