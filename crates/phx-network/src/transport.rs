//! TCP transport: framing, per-connection tasks, and the listener.
//!
//! Each connection gets a reader task that turns frames into
//! [`PeerEvent`]s and a writer task that drains the peer's outbound queue.
//! A frame with a bad header desynchronizes the stream and closes the
//! connection; a frame whose payload fails to decode is skipped.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use phx_core::constants::NetworkType;
use phx_core::error::NetworkError;

use crate::config::NetworkConfig;
use crate::peer::{Peer, PeerSet};
use crate::protocol::{FrameHeader, HEADER_SIZE, NetworkMessage};

/// Something that happened on a peer connection.
#[derive(Debug, Clone)]
pub enum PeerEvent {
    Connected(Arc<Peer>),
    Message {
        peer: Arc<Peer>,
        message: NetworkMessage,
    },
    Disconnected(String),
}

fn io_error(e: io::Error) -> NetworkError {
    NetworkError::Io(e.to_string())
}

/// Read one frame header and its payload without decoding the payload.
pub async fn read_frame<R>(
    reader: &mut R,
    network: NetworkType,
) -> Result<(FrameHeader, Vec<u8>), NetworkError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header).await.map_err(io_error)?;
    let frame = FrameHeader::parse(network, &header)?;
    let mut payload = vec![0u8; frame.payload_len];
    reader.read_exact(&mut payload).await.map_err(io_error)?;
    Ok((frame, payload))
}

/// Read and decode one message.
pub async fn read_message<R>(reader: &mut R, network: NetworkType) -> Result<NetworkMessage, NetworkError>
where
    R: AsyncRead + Unpin,
{
    let (frame, payload) = read_frame(reader, network).await?;
    frame.open(&payload)
}

/// Encode and write one message, flushing the writer.
pub async fn write_message<W>(
    writer: &mut W,
    network: NetworkType,
    message: &NetworkMessage,
) -> Result<(), NetworkError>
where
    W: AsyncWrite + Unpin,
{
    let frame = message.encode(network)?;
    writer.write_all(&frame).await.map_err(io_error)?;
    writer.flush().await.map_err(io_error)
}

/// Register `stream` as a peer and spawn its reader and writer tasks.
fn spawn_connection(
    stream: TcpStream,
    network: NetworkType,
    peers: Arc<PeerSet>,
    events: mpsc::UnboundedSender<PeerEvent>,
) -> Result<Arc<Peer>, NetworkError> {
    let addr = stream.peer_addr().map_err(io_error)?.to_string();
    let (peer, mut outbound) = Peer::channel(addr.clone());
    peers.insert(Arc::clone(&peer))?;
    let (mut reader, mut writer) = stream.into_split();

    let writer_addr = addr.clone();
    tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if let Err(e) = write_message(&mut writer, network, &message).await {
                debug!(peer = %writer_addr, "write failed: {e}");
                break;
            }
        }
    });

    // Queue Connected before the reader can produce any Message.
    let _ = events.send(PeerEvent::Connected(Arc::clone(&peer)));

    let reader_peer = Arc::clone(&peer);
    tokio::spawn(async move {
        loop {
            let (frame, payload) = match read_frame(&mut reader, network).await {
                Ok(frame) => frame,
                Err(e) => {
                    debug!(peer = %addr, "connection closed: {e}");
                    break;
                }
            };
            match frame.open(&payload) {
                Ok(message) => {
                    let event = PeerEvent::Message {
                        peer: Arc::clone(&reader_peer),
                        message,
                    };
                    if events.send(event).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    debug!(peer = %addr, command = %frame.command, "skipping undecodable message: {e}");
                }
            }
        }
        peers.remove(&addr);
        let _ = events.send(PeerEvent::Disconnected(addr));
    });

    Ok(peer)
}

/// Handle to the running P2P listener.
///
/// Dropping the node stops accepting new connections. Established
/// connections keep running until the remote side closes them.
#[derive(Debug)]
pub struct NetworkNode {
    network: NetworkType,
    local_addr: SocketAddr,
    peers: Arc<PeerSet>,
    events: mpsc::UnboundedSender<PeerEvent>,
    accept_task: JoinHandle<()>,
}

impl NetworkNode {
    /// Bind the listener, dial configured peers, and start accepting.
    ///
    /// The returned receiver yields every [`PeerEvent`] from every
    /// connection.
    pub async fn start(
        config: NetworkConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PeerEvent>), NetworkError> {
        let listener = TcpListener::bind(config.listen_socket())
            .await
            .map_err(io_error)?;
        let local_addr = listener.local_addr().map_err(io_error)?;
        info!(%local_addr, network = config.network.name(), "listening for peers");

        let (events, event_rx) = mpsc::unbounded_channel();
        let peers = Arc::new(PeerSet::new(config.max_peers));
        let network = config.network;

        let accept_peers = Arc::clone(&peers);
        let accept_events = events.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        match spawn_connection(
                            stream,
                            network,
                            Arc::clone(&accept_peers),
                            accept_events.clone(),
                        ) {
                            Ok(_) => debug!(%remote, "inbound peer connected"),
                            Err(e) => debug!(%remote, "refusing inbound peer: {e}"),
                        }
                    }
                    Err(e) => {
                        warn!("accept failed: {e}");
                    }
                }
            }
        });

        let node = Self {
            network,
            local_addr,
            peers,
            events,
            accept_task,
        };

        for addr in &config.connect {
            if let Err(e) = node.connect(addr).await {
                warn!(%addr, "failed to connect to configured peer: {e}");
            }
        }

        Ok((node, event_rx))
    }

    /// Dial `addr` and register the connection.
    pub async fn connect(&self, addr: &str) -> Result<Arc<Peer>, NetworkError> {
        let stream = TcpStream::connect(addr).await.map_err(io_error)?;
        let peer = spawn_connection(stream, self.network, Arc::clone(&self.peers), self.events.clone())?;
        info!(peer = %peer.addr(), "outbound peer connected");
        Ok(peer)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn network(&self) -> NetworkType {
        self.network
    }

    /// The live peer table.
    pub fn peers(&self) -> Arc<PeerSet> {
        Arc::clone(&self.peers)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }
}

impl Drop for NetworkNode {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use phx_checkpoint::message::{SignedCheckpoint, UnsignedCheckpoint};
    use phx_core::crypto::MasterKey;
    use phx_core::types::Hash256;
    use std::time::Duration;

    const NET: NetworkType = NetworkType::Testnet;

    fn local_config() -> NetworkConfig {
        NetworkConfig {
            network: NET,
            listen_addr: "127.0.0.1".to_string(),
            listen_port: 0,
            connect: Vec::new(),
            max_peers: 8,
        }
    }

    async fn next_event(rx: &mut mpsc::UnboundedReceiver<PeerEvent>) -> PeerEvent {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for peer event")
            .expect("event channel closed")
    }

    #[tokio::test]
    async fn framed_roundtrip_over_duplex() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let msg = NetworkMessage::GetBlocks {
            locator: vec![Hash256([1; 32]), Hash256([2; 32])],
            stop: Hash256::ZERO,
        };
        write_message(&mut a, NET, &msg).await.unwrap();
        assert_eq!(read_message(&mut b, NET).await.unwrap(), msg);
    }

    #[tokio::test]
    async fn wrong_network_magic_rejected() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        write_message(&mut a, NetworkType::Mainnet, &NetworkMessage::GetData(Vec::new()))
            .await
            .unwrap();
        assert_eq!(read_message(&mut b, NET).await, Err(NetworkError::BadMagic));
    }

    #[tokio::test]
    async fn truncated_stream_is_io_error() {
        let (mut a, mut b) = tokio::io::duplex(4096);
        let frame = NetworkMessage::GetData(Vec::new()).encode(NET).unwrap();
        a.write_all(&frame[..HEADER_SIZE - 3]).await.unwrap();
        drop(a);
        assert!(matches!(read_message(&mut b, NET).await, Err(NetworkError::Io(_))));
    }

    #[tokio::test]
    async fn checkpoint_delivered_between_nodes() {
        let (server, mut server_events) = NetworkNode::start(local_config()).await.unwrap();
        let (client, mut client_events) = NetworkNode::start(local_config()).await.unwrap();

        let outbound = client.connect(&server.local_addr().to_string()).await.unwrap();
        assert!(matches!(next_event(&mut client_events).await, PeerEvent::Connected(_)));
        assert!(matches!(next_event(&mut server_events).await, PeerEvent::Connected(_)));

        let key = MasterKey::generate();
        let checkpoint = SignedCheckpoint::sign(&UnsignedCheckpoint::new(Hash256([7; 32])), &key).unwrap();
        outbound.send(NetworkMessage::Checkpoint(checkpoint.clone())).unwrap();

        match next_event(&mut server_events).await {
            PeerEvent::Message { message, .. } => {
                assert_eq!(message, NetworkMessage::Checkpoint(checkpoint));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(server.peer_count(), 1);
        assert_eq!(client.peer_count(), 1);
    }

    #[tokio::test]
    async fn disconnect_removes_peer() {
        let (server, mut server_events) = NetworkNode::start(local_config()).await.unwrap();
        let stream = TcpStream::connect(server.local_addr()).await.unwrap();
        assert!(matches!(next_event(&mut server_events).await, PeerEvent::Connected(_)));
        drop(stream);
        assert!(matches!(next_event(&mut server_events).await, PeerEvent::Disconnected(_)));
        assert_eq!(server.peer_count(), 0);
    }
}
