//! Wire message types for the Phoenix P2P protocol.
//!
//! Every message travels in an envelope:
//!
//! | bytes | field |
//! |---|---|
//! | 4 | network magic |
//! | 12 | command name, NUL padded |
//! | 4 | payload length (LE) |
//! | 4 | first 4 bytes of the payload's double SHA-256 |
//!
//! Payloads use the same fixed-width little-endian integers and
//! compact-size prefixes as the checkpoint message itself.

use phx_checkpoint::message::SignedCheckpoint;
use phx_core::codec::{Reader, write_compact_size};
use phx_core::constants::{MAX_LOCATOR_SIZE, MAX_PAYLOAD_SIZE, NetworkType};
use phx_core::error::{CodecError, NetworkError};
use phx_core::types::Hash256;

/// Length of the command field.
pub const COMMAND_SIZE: usize = 12;

/// Envelope size before the payload.
pub const HEADER_SIZE: usize = 4 + COMMAND_SIZE + 4 + 4;

/// Largest accepted frame.
pub const MAX_MESSAGE_SIZE: usize = HEADER_SIZE + MAX_PAYLOAD_SIZE;

/// Maximum entries in one `getdata`.
pub const MAX_INV_SIZE: usize = 50_000;

/// Protocol version carried by `getblocks`.
pub const PROTOCOL_VERSION: u32 = 1;

pub const CMD_CHECKPOINT: &str = "checkpoint";
pub const CMD_GETBLOCKS: &str = "getblocks";
pub const CMD_GETDATA: &str = "getdata";

/// Kind of object named by an [`Inventory`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryKind {
    Tx,
    Block,
}

impl InventoryKind {
    fn code(self) -> u32 {
        match self {
            Self::Tx => 1,
            Self::Block => 2,
        }
    }

    fn from_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(Self::Tx),
            2 => Some(Self::Block),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Inventory {
    pub kind: InventoryKind,
    pub hash: Hash256,
}

impl Inventory {
    pub fn block(hash: Hash256) -> Self {
        Self {
            kind: InventoryKind::Block,
            hash,
        }
    }
}

/// A network message exchanged between Phoenix peers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetworkMessage {
    /// A signed sync checkpoint.
    Checkpoint(SignedCheckpoint),
    /// Ask for block inventory after the locator's fork point, up to `stop`.
    GetBlocks { locator: Vec<Hash256>, stop: Hash256 },
    /// Ask for specific objects.
    GetData(Vec<Inventory>),
}

impl NetworkMessage {
    /// Command name used in the envelope.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Checkpoint(_) => CMD_CHECKPOINT,
            Self::GetBlocks { .. } => CMD_GETBLOCKS,
            Self::GetData(_) => CMD_GETDATA,
        }
    }

    /// Check size limits before encoding or after decoding.
    pub fn validate(&self) -> Result<(), NetworkError> {
        match self {
            Self::GetBlocks { locator, .. } if locator.len() > MAX_LOCATOR_SIZE => {
                Err(NetworkError::LocatorTooLarge {
                    size: locator.len(),
                    max: MAX_LOCATOR_SIZE,
                })
            }
            Self::GetData(items) if items.len() > MAX_INV_SIZE => {
                Err(NetworkError::MessageTooLarge { size: items.len() })
            }
            _ => Ok(()),
        }
    }

    fn payload(&self) -> Vec<u8> {
        match self {
            Self::Checkpoint(checkpoint) => checkpoint.encode(),
            Self::GetBlocks { locator, stop } => {
                let mut buf = Vec::with_capacity(4 + 9 + 32 * (locator.len() + 1));
                buf.extend_from_slice(&PROTOCOL_VERSION.to_le_bytes());
                write_compact_size(&mut buf, locator.len() as u64);
                for hash in locator {
                    buf.extend_from_slice(hash.as_bytes());
                }
                buf.extend_from_slice(stop.as_bytes());
                buf
            }
            Self::GetData(items) => {
                let mut buf = Vec::with_capacity(9 + 36 * items.len());
                write_compact_size(&mut buf, items.len() as u64);
                for item in items {
                    buf.extend_from_slice(&item.kind.code().to_le_bytes());
                    buf.extend_from_slice(item.hash.as_bytes());
                }
                buf
            }
        }
    }

    fn from_payload(command: &str, payload: &[u8]) -> Result<Self, NetworkError> {
        let msg = match command {
            CMD_CHECKPOINT => Self::Checkpoint(SignedCheckpoint::decode(payload)?),
            CMD_GETBLOCKS => {
                let mut reader = Reader::new(payload);
                let _version = reader.read_u32_le()?;
                let count = reader.read_compact_size()?;
                if count > MAX_LOCATOR_SIZE as u64 {
                    return Err(NetworkError::LocatorTooLarge {
                        size: usize::try_from(count).unwrap_or(usize::MAX),
                        max: MAX_LOCATOR_SIZE,
                    });
                }
                let locator = (0..count)
                    .map(|_| reader.read_hash())
                    .collect::<Result<Vec<_>, _>>()?;
                let stop = reader.read_hash()?;
                reader.finish()?;
                Self::GetBlocks { locator, stop }
            }
            CMD_GETDATA => {
                let mut reader = Reader::new(payload);
                let count = reader.read_compact_size()?;
                if count > MAX_INV_SIZE as u64 {
                    return Err(NetworkError::MessageTooLarge {
                        size: usize::try_from(count).unwrap_or(usize::MAX),
                    });
                }
                let mut items = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    let code = reader.read_u32_le()?;
                    let hash = reader.read_hash()?;
                    let kind = InventoryKind::from_code(code).ok_or_else(|| {
                        NetworkError::UnknownCommand(format!("inventory type {code}"))
                    })?;
                    items.push(Inventory { kind, hash });
                }
                reader.finish()?;
                Self::GetData(items)
            }
            other => return Err(NetworkError::UnknownCommand(other.to_string())),
        };
        Ok(msg)
    }

    /// Encode as a complete frame for `network`.
    pub fn encode(&self, network: NetworkType) -> Result<Vec<u8>, NetworkError> {
        self.validate()?;
        let payload = self.payload();
        if payload.len() > MAX_PAYLOAD_SIZE {
            return Err(NetworkError::MessageTooLarge { size: payload.len() });
        }
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
        buf.extend_from_slice(&network.magic_bytes());
        let mut command = [0u8; COMMAND_SIZE];
        let name = self.command().as_bytes();
        command[..name.len()].copy_from_slice(name);
        buf.extend_from_slice(&command);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&checksum(&payload));
        buf.extend_from_slice(&payload);
        Ok(buf)
    }

    /// Decode a complete frame.
    pub fn decode(network: NetworkType, data: &[u8]) -> Result<Self, NetworkError> {
        if data.len() > MAX_MESSAGE_SIZE {
            return Err(NetworkError::MessageTooLarge { size: data.len() });
        }
        let header = FrameHeader::parse(network, data)?;
        let payload = &data[HEADER_SIZE..];
        if payload.len() != header.payload_len {
            return Err(NetworkError::Codec(CodecError::UnexpectedEof {
                needed: header.payload_len,
                remaining: payload.len(),
            }));
        }
        header.open(payload)
    }
}

/// Parsed envelope of a frame whose payload has not been read yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub command: String,
    pub payload_len: usize,
    checksum: [u8; 4],
}

impl FrameHeader {
    /// Parse the first [`HEADER_SIZE`] bytes of `data`.
    pub fn parse(network: NetworkType, data: &[u8]) -> Result<Self, NetworkError> {
        let mut reader = Reader::new(data);
        let magic: [u8; 4] = reader.read_array()?;
        if magic != network.magic_bytes() {
            return Err(NetworkError::BadMagic);
        }
        let raw_command: [u8; COMMAND_SIZE] = reader.read_array()?;
        let end = raw_command.iter().position(|&b| b == 0).unwrap_or(COMMAND_SIZE);
        if raw_command[end..].iter().any(|&b| b != 0) {
            return Err(NetworkError::UnknownCommand(
                String::from_utf8_lossy(&raw_command).into_owned(),
            ));
        }
        let command = String::from_utf8_lossy(&raw_command[..end]).into_owned();
        let payload_len = reader.read_u32_le()? as usize;
        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(NetworkError::MessageTooLarge { size: payload_len });
        }
        let checksum: [u8; 4] = reader.read_array()?;
        Ok(Self {
            command,
            payload_len,
            checksum,
        })
    }

    /// Check the payload checksum and decode the message.
    pub fn open(&self, payload: &[u8]) -> Result<NetworkMessage, NetworkError> {
        if checksum(payload) != self.checksum {
            return Err(NetworkError::BadChecksum);
        }
        let msg = NetworkMessage::from_payload(&self.command, payload)?;
        msg.validate()?;
        Ok(msg)
    }
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = Hash256::double_sha256(payload);
    let mut out = [0u8; 4];
    out.copy_from_slice(&digest.as_bytes()[..4]);
    out
}
