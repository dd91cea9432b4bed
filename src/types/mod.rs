//! Core chain types consumed by the sealing and verification engines.

pub mod block;
pub mod header;

pub use block::Block;
pub use header::{BlockNonce, Header, Signature};

use once_cell::sync::Lazy;
use sha3::{Digest, Keccak256};

/// 32-byte hash, big-endian display.
pub type Hash = primitive_types::H256;

/// 20-byte account address.
pub type Address = primitive_types::H160;

/// Keccak-256, the header identity hash.
pub fn keccak256(data: &[u8]) -> Hash {
    Hash::from_slice(&Keccak256::digest(data))
}

/// Hash of the RLP empty list: the uncle hash of a block with no uncles.
pub static EMPTY_UNCLE_HASH: Lazy<Hash> = Lazy::new(|| keccak256(&rlp::EMPTY_LIST_RLP));
