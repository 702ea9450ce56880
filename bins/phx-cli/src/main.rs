//! phx-cli -- Command-line RPC client for a Phoenix node.
//!
//! Queries and drives the synchronized checkpoint of a running node, and
//! generates checkpoint key pairs for private test networks.

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use phx_core::constants::DEFAULT_RPC_PORT;
use phx_core::crypto::MasterKey;

/// Phoenix node RPC client.
#[derive(Parser)]
#[command(name = "phx-cli")]
#[command(version, about = "Command-line client for a Phoenix node")]
struct Cli {
    /// RPC endpoint URL.
    #[arg(short, long, global = true, default_value_t = format!("http://127.0.0.1:{DEFAULT_RPC_PORT}"))]
    rpc_endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the best header height.
    GetBlockCount,
    /// Show the current sync checkpoint.
    GetCheckpoint,
    /// Sign and broadcast a checkpoint for a block (authority only).
    SendCheckpoint {
        /// Block hash (64 hex characters, display order).
        hash: String,
    },
    /// Sign and broadcast a checkpoint at the node's configured depth
    /// (authority only).
    AutoCheckpoint,
    /// Reset the sync checkpoint to the last hardened checkpoint.
    ResetCheckpoint,
    /// Generate a new checkpoint key pair. Does not contact the node.
    GenerateKey,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::GetBlockCount => call(&cli.rpc_endpoint, "getblockcount", ArrayParams::new()).await,
        Commands::GetCheckpoint => call(&cli.rpc_endpoint, "getcheckpoint", ArrayParams::new()).await,
        Commands::SendCheckpoint { hash } => {
            let hash = hash.trim().to_string();
            if hash.len() != 64 || hex::decode(&hash).is_err() {
                bail!("hash must be 64 hex characters");
            }
            let mut params = ArrayParams::new();
            params.insert(hash).context("failed to encode params")?;
            call(&cli.rpc_endpoint, "sendcheckpoint", params).await
        }
        Commands::AutoCheckpoint => call(&cli.rpc_endpoint, "autocheckpoint", ArrayParams::new()).await,
        Commands::ResetCheckpoint => call(&cli.rpc_endpoint, "resetcheckpoint", ArrayParams::new()).await,
        Commands::GenerateKey => {
            let key = MasterKey::generate();
            println!("secret: {}", key.secret_hex().as_str());
            println!("public: {}", hex::encode(key.public_key().to_uncompressed()));
            Ok(())
        }
    }
}

fn client(endpoint: &str) -> Result<HttpClient> {
    HttpClientBuilder::default()
        .build(endpoint)
        .with_context(|| format!("failed to connect to RPC at {endpoint}"))
}

/// Call `method` and pretty-print the JSON result.
async fn call(endpoint: &str, method: &str, params: ArrayParams) -> Result<()> {
    let result: serde_json::Value = client(endpoint)?
        .request(method, params)
        .await
        .with_context(|| format!("RPC {method} failed"))?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
