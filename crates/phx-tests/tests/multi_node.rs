//! Multi-node checkpoint propagation over real TCP connections.
//!
//! Each test starts nodes on loopback with ephemeral ports, a shared
//! locally generated checkpoint authority, and identical header chains fed
//! through `accept_block_header`.

use std::sync::Arc;
use std::time::Duration;

use phx_checkpoint::{CheckpointRegistry, ProcessOutcome, SignatureAuthority};
use phx_core::constants::NetworkType;
use phx_core::types::Hash256;
use phx_network::NetworkConfig;
use phx_node_lib::config::NodeConfig;
use phx_node_lib::node::Node;
use phx_tests::helpers::{block_hash, local_authority};

const NET: NetworkType = NetworkType::Testnet;

fn node_config(dir: &tempfile::TempDir, connect: Vec<String>) -> NodeConfig {
    NodeConfig {
        data_dir: dir.path().to_path_buf(),
        network: NetworkConfig {
            listen_addr: "127.0.0.1".into(),
            listen_port: 0,
            connect,
            ..NetworkConfig::testnet()
        },
        ..NodeConfig::for_network(NET)
    }
}

async fn spawn_node(
    dir: &tempfile::TempDir,
    authority: SignatureAuthority,
    connect: Vec<String>,
) -> Arc<Node> {
    let node = Node::start(node_config(dir, connect), authority).await.unwrap();
    assert!(node.network().is_some(), "network failed to start");
    let runner = Arc::clone(&node);
    tokio::spawn(async move { runner.run().await });
    node
}

fn listen_addr(node: &Node) -> String {
    node.network().unwrap().local_addr().to_string()
}

/// Connect the testnet hardened block and `len` more headers above it.
fn feed_headers(node: &Node, len: u32) -> Vec<Hash256> {
    let hardened = *CheckpointRegistry::for_network(NET).lookup(1).unwrap();
    node.accept_block_header(hardened.hash, NET.genesis_hash(), hardened.timestamp)
        .unwrap();
    let mut hashes = vec![hardened.hash];
    for height in 2..len + 2 {
        let hash = block_hash(1, height);
        node.accept_block_header(hash, hashes[hashes.len() - 1], hardened.timestamp + height * 60)
            .unwrap();
        hashes.push(hash);
    }
    hashes
}

async fn wait_for<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("timed out waiting for {what}");
}

#[tokio::test]
async fn checkpoint_propagates_to_connected_peer() {
    let (authority, _) = local_authority();
    let (dir_a, dir_b) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
    let a = spawn_node(&dir_a, authority.clone(), Vec::new()).await;
    let b = spawn_node(&dir_b, authority.clone(), vec![listen_addr(&a)]).await;
    wait_for("connection", || a.peer_count() == 1 && b.peer_count() == 1).await;

    let chain_a = feed_headers(&a, 20);
    let chain_b = feed_headers(&b, 20);
    assert_eq!(chain_a, chain_b);

    let target = chain_a[15];
    assert_eq!(a.send_checkpoint(target), Ok(ProcessOutcome::Adopted));
    wait_for("checkpoint on b", || b.checkpoint_info().hash == target).await;
    assert_eq!(b.checkpoints().last_message().unwrap().hash(), target);
}

#[tokio::test]
async fn pending_checkpoint_adopted_after_headers_arrive() {
    let (authority, _) = local_authority();
    let (dir_a, dir_b) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
    let a = spawn_node(&dir_a, authority.clone(), Vec::new()).await;
    let b = spawn_node(&dir_b, authority.clone(), vec![listen_addr(&a)]).await;
    wait_for("connection", || a.peer_count() == 1 && b.peer_count() == 1).await;

    let chain = feed_headers(&a, 10);
    let target = chain[8];
    a.send_checkpoint(target).unwrap();
    wait_for("pending on b", || b.checkpoint_info().pending == Some(target)).await;
    assert_eq!(b.checkpoint_info().hash, NET.genesis_hash());

    feed_headers(&b, 10);
    assert_eq!(b.checkpoint_info().hash, target);
    assert_eq!(b.checkpoint_info().pending, None);
}

#[tokio::test]
async fn late_peer_is_greeted_with_current_checkpoint() {
    let (authority, _) = local_authority();
    let (dir_a, dir_c) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
    let a = spawn_node(&dir_a, authority.clone(), Vec::new()).await;
    let chain = feed_headers(&a, 12);
    let target = chain[10];
    a.send_checkpoint(target).unwrap();

    // The late node already has the headers but no checkpoint.
    let c = Node::offline(node_config(&dir_c, Vec::new()), authority.clone()).unwrap();
    feed_headers(&c, 12);
    drop(c);

    let c = spawn_node(&dir_c, authority, vec![listen_addr(&a)]).await;
    assert_eq!(c.block_count(), 13);
    wait_for("greeting on c", || c.checkpoint_info().hash == target).await;
}

#[tokio::test]
async fn foreign_authority_checkpoint_is_ignored() {
    let (authority_a, _) = local_authority();
    let (authority_b, _) = local_authority();
    let (dir_a, dir_b) = (tempfile::tempdir().unwrap(), tempfile::tempdir().unwrap());
    let a = spawn_node(&dir_a, authority_a, Vec::new()).await;
    let b = spawn_node(&dir_b, authority_b, vec![listen_addr(&a)]).await;
    wait_for("connection", || a.peer_count() == 1 && b.peer_count() == 1).await;

    let chain = feed_headers(&a, 6);
    feed_headers(&b, 6);
    a.send_checkpoint(chain[5]).unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    let info = b.checkpoint_info();
    assert_eq!(info.hash, NET.genesis_hash());
    assert_eq!(info.pending, None);
}
