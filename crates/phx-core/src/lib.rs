//! # phx-core
//! Foundation types, codecs, crypto and chain-index interfaces for Phoenix.

pub mod chain_index;
pub mod codec;
pub mod constants;
pub mod crypto;
pub mod error;
pub mod store;
pub mod types;
