//! Error types for the Phoenix protocol.
use thiserror::Error;

use crate::types::Hash256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("unexpected end of data: need {needed} bytes, {remaining} remaining")] UnexpectedEof { needed: usize, remaining: usize },
    #[error("{0} trailing bytes after payload")] TrailingBytes(usize),
    #[error("field too large: {size} > {max}")] FieldTooLarge { size: usize, max: usize },
    #[error("non-canonical compact size")] NonCanonicalLength,
    #[error("invalid hex: {0}")] InvalidHex(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid public key bytes")] InvalidPublicKey,
    #[error("invalid private key bytes")] InvalidPrivateKey,
    #[error("invalid signature encoding")] InvalidSignature,
    #[error("signature verification failed")] VerificationFailed,
    #[error("signing failed")] SigningFailed,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("block not found: {0}")] UnknownBlock(Hash256),
    #[error("parent {parent} of block {hash} not found")] UnknownParent { hash: Hash256, parent: Hash256 },
    #[error("duplicate block: {0}")] DuplicateBlock(Hash256),
    #[error("stale block handle")] StaleHandle,
    #[error("reorganization failed: {0}")] ReorgFailed(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database: {0}")] Backend(String),
    #[error("corrupt record: {0}")] Corrupt(String),
    #[error("missing column family: {0}")] MissingColumnFamily(String),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("peer disconnected: {0}")] PeerDisconnected(String),
    #[error("message too large: {size}")] MessageTooLarge { size: usize },
    #[error("locator too large: {size} > {max}")] LocatorTooLarge { size: usize, max: usize },
    #[error("bad network magic")] BadMagic,
    #[error("bad payload checksum")] BadChecksum,
    #[error("unknown command: {0}")] UnknownCommand(String),
    #[error("peer limit reached: {0}")] PeerLimit(usize),
    #[error("io: {0}")] Io(String),
    #[error("codec: {0}")] Codec(#[from] CodecError),
}
